//! Eddy I/O: durable file primitives.
//!
//! Everything that touches the filesystem for the index goes through here, so
//! the crash-safety rules (write aside, sync, rename, sync the directory) live
//! in one place.

pub mod storage;

pub use storage::{read_if_exists, write_atomic, IoError};
