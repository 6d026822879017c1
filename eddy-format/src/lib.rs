use bytecheck::CheckBytes;
use rkyv::ser::serializers::AllocSerializer;
use rkyv::ser::Serializer;
use rkyv::with::RefAsBox;
use rkyv::{AlignedVec, Archive, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub use rkyv::AlignedVec as SnapshotBytes;

/// 'EDDX' in little-endian ASCII. Identifies EDDY snapshot files.
pub const SNAPSHOT_MAGIC: u32 = 0x5844_4445;

/// Current snapshot layout version.
pub const FORMAT_VERSION: u16 = 1;

/// Size of the fixed header preceding the archived body.
pub const HEADER_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Snapshot too short for header: {0} bytes")]
    TooShort(usize),
    #[error("Invalid magic number: 0x{0:08x}")]
    BadMagic(u32),
    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u16),
    #[error("Body length mismatch: header says {expected} bytes, file has {actual}")]
    LengthMismatch { expected: u64, actual: u64 },
    #[error("Archive validation failed: {0}")]
    InvalidArchive(String),
    #[error("Failed to encode snapshot: {0}")]
    Encode(String),
    #[error("Snapshot is inconsistent: {0}")]
    Inconsistent(String),
}

/// The fixed binary header of a snapshot file.
///
/// # Layout (little endian)
/// - `magic` (4 bytes): Must be `0x58444445`.
/// - `version` (2 bytes): Layout version (currently 1).
/// - `reserved` (2 bytes): Zero.
/// - `body_len` (8 bytes): Length of the archived body that follows.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u16,
    pub reserved: u16,
    pub body_len: u64,
}

impl SnapshotHeader {
    pub fn new(body_len: u64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            reserved: 0,
            body_len,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..6].copy_from_slice(&self.version.to_le_bytes());
        out[6..8].copy_from_slice(&self.reserved.to_le_bytes());
        out[8..16].copy_from_slice(&self.body_len.to_le_bytes());
        out
    }
}

/// Parses the header at the front of `bytes` and validates magic and version.
pub fn verify_header(bytes: &[u8]) -> Result<SnapshotHeader, FormatError> {
    if bytes.len() < HEADER_LEN {
        return Err(FormatError::TooShort(bytes.len()));
    }

    let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if magic != SNAPSHOT_MAGIC {
        return Err(FormatError::BadMagic(magic));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }

    let reserved = u16::from_le_bytes([bytes[6], bytes[7]]);
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[8..16]);

    Ok(SnapshotHeader {
        magic,
        version,
        reserved,
        body_len: u64::from_le_bytes(len),
    })
}

/// Archived layout of a snapshot body, borrowing the index's own buffers so
/// encoding does not copy the arena first.
///
/// `data` is the row-major vector arena: entry `i` owns
/// `data[i * dimension..(i + 1) * dimension]` and carries id `ids[i]`.
#[derive(Archive, Serialize, Debug, Clone, Copy)]
#[archive_attr(derive(CheckBytes))]
pub struct SnapshotView<'a> {
    pub dimension: u32,
    #[with(RefAsBox)]
    pub ids: &'a [u64],
    #[with(RefAsBox)]
    pub data: &'a [f32],
}

/// A decoded snapshot, owning its buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotBody {
    pub dimension: u32,
    pub ids: Vec<u64>,
    pub data: Vec<f32>,
}

impl SnapshotBody {
    pub fn view(&self) -> SnapshotView<'_> {
        SnapshotView {
            dimension: self.dimension,
            ids: &self.ids,
            data: &self.data,
        }
    }

    /// Structural checks the archive validator cannot express.
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.dimension == 0 {
            return Err(FormatError::Inconsistent("dimension is zero".into()));
        }
        let expected = self.ids.len() * self.dimension as usize;
        if self.data.len() != expected {
            return Err(FormatError::Inconsistent(format!(
                "{} ids of dimension {} need {} floats, found {}",
                self.ids.len(),
                self.dimension,
                expected,
                self.data.len()
            )));
        }
        let mut seen = HashSet::with_capacity(self.ids.len());
        for id in &self.ids {
            if !seen.insert(*id) {
                return Err(FormatError::Inconsistent(format!("duplicate id {}", id)));
            }
        }
        Ok(())
    }
}

/// Serializes a snapshot into header + archive bytes.
///
/// The header is written into the serializer's buffer first and patched with
/// the body length afterwards, so the output is the only copy made.
/// `HEADER_LEN` is a multiple of 16, which keeps the archive aligned.
pub fn encode_snapshot(view: &SnapshotView<'_>) -> Result<SnapshotBytes, FormatError> {
    let mut serializer = AllocSerializer::<4096>::default();
    serializer
        .write(&SnapshotHeader::new(0).to_bytes())
        .map_err(|e| FormatError::Encode(format!("{:?}", e)))?;
    serializer
        .serialize_value(view)
        .map_err(|e| FormatError::Encode(format!("{:?}", e)))?;

    let mut out = serializer.into_serializer().into_inner();
    let body_len = (out.len() - HEADER_LEN) as u64;
    out[..HEADER_LEN].copy_from_slice(&SnapshotHeader::new(body_len).to_bytes());
    Ok(out)
}

/// Validates and deserializes a complete snapshot file image.
///
/// # Errors
/// Any truncation, foreign file, or corrupted archive is reported; this never
/// yields a partially populated body.
pub fn decode_snapshot(bytes: &[u8]) -> Result<SnapshotBody, FormatError> {
    let header = verify_header(bytes)?;

    let actual = (bytes.len() - HEADER_LEN) as u64;
    if header.body_len != actual {
        return Err(FormatError::LengthMismatch {
            expected: header.body_len,
            actual,
        });
    }

    // The archive must sit on an aligned buffer for bytecheck.
    let mut aligned = AlignedVec::with_capacity(bytes.len() - HEADER_LEN);
    aligned.extend_from_slice(&bytes[HEADER_LEN..]);

    let archived = rkyv::check_archived_root::<SnapshotView<'static>>(&aligned[..])
        .map_err(|e| FormatError::InvalidArchive(format!("{:?}", e)))?;
    let body = SnapshotBody {
        dimension: archived.dimension,
        ids: archived.ids.to_vec(),
        data: archived.data.to_vec(),
    };

    body.validate()?;
    Ok(body)
}
