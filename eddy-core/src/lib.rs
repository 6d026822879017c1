//! Eddy Core: exact nearest-neighbour search over a mutable vector store.
//!
//! - [`index::flat::FlatIndex`] holds the entries and answers queries.
//! - [`shared::SharedIndex`] serializes access for concurrent handlers.
//! - [`storage::snapshot`] persists and restores the store.
//! - [`lifecycle::IndexLifecycle`] loads at startup and snapshots at shutdown.

pub mod error;
pub mod index;
pub mod lifecycle;
pub mod shared;
pub mod storage;

pub use error::{IndexError, PersistenceError, Result};
pub use index::flat::FlatIndex;
pub use index::{SearchResult, VectorIndex};
pub use lifecycle::{IndexConfig, IndexLifecycle, ShutdownReport};
pub use shared::SharedIndex;
