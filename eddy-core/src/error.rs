use eddy_format::FormatError;
use eddy_io::IoError;
use std::time::Duration;
use thiserror::Error;

/// Failures while writing or reading a snapshot.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("Corrupt snapshot: {0}")]
    Format(#[from] FormatError),
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Vector has {got} components, index dimension is {expected}")]
    DimensionError { expected: usize, got: usize },
    #[error("{vectors} vectors supplied with {ids} ids")]
    DimensionMismatch { vectors: usize, ids: usize },
    #[error("Id {id} collides with an existing entry")]
    IdCollision { id: u64 },
    #[error("Auto-assigned id {id} is already taken; supply explicit image_ids for this insert")]
    AutoIdCollision { id: u64 },
    #[error("No ids specified")]
    MissingIds,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Persistence failure: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Index lock not acquired within {0:?}")]
    LockTimeout(Duration),
}

impl IndexError {
    /// Stable name of the error kind, for translation to a wire protocol.
    pub fn kind(&self) -> &'static str {
        match self {
            IndexError::DimensionError { .. } => "DimensionError",
            IndexError::DimensionMismatch { .. } => "DimensionMismatch",
            IndexError::IdCollision { .. } | IndexError::AutoIdCollision { .. } => "IdCollision",
            IndexError::MissingIds => "MissingIds",
            IndexError::InvalidArgument(_) => "InvalidArgument",
            IndexError::Persistence(_) => "PersistenceError",
            IndexError::LockTimeout(_) => "LockTimeout",
        }
    }
}

pub type Result<T, E = IndexError> = std::result::Result<T, E>;
