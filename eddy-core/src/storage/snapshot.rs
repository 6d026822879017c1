use crate::error::{IndexError, PersistenceError, Result};
use crate::index::flat::FlatIndex;
use crate::index::VectorIndex;
use eddy_format::{decode_snapshot, encode_snapshot, FormatError, SnapshotBytes, SnapshotView};
use eddy_io::{read_if_exists, write_atomic};
use log::{info, warn};
use std::path::Path;

/// Serializes the whole index into snapshot file bytes, archiving straight
/// from the index's id list and arena.
pub fn encode(index: &FlatIndex) -> Result<SnapshotBytes, PersistenceError> {
    let dimension = u32::try_from(index.dimension()).map_err(|_| {
        FormatError::Encode(format!("dimension {} does not fit the format", index.dimension()))
    })?;
    let (ids, data) = index.as_parts();
    Ok(encode_snapshot(&SnapshotView { dimension, ids, data })?)
}

/// Atomically replaces whatever is at `path` with `bytes`.
pub fn write(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    write_atomic(path, bytes)?;
    info!("Snapshot written to {}", path.display());
    Ok(())
}

/// Restores the index saved at `path`.
///
/// A missing file yields an empty index of `fallback_dimension`. A file that
/// exists but cannot be read or decoded is an error: starting empty would
/// throw away everything that was previously durable.
pub fn load(path: &Path, fallback_dimension: usize) -> Result<FlatIndex> {
    let bytes = match read_if_exists(path).map_err(PersistenceError::from)? {
        Some(bytes) => bytes,
        None => {
            info!("No snapshot at {}, starting empty (Dim: {})", path.display(), fallback_dimension);
            return FlatIndex::new(fallback_dimension);
        }
    };

    let body = decode_snapshot(&bytes).map_err(PersistenceError::from)?;
    let dimension = body.dimension as usize;
    if dimension != fallback_dimension {
        warn!(
            "Snapshot {} has dimension {}, configured dimension is {}. Using the snapshot's.",
            path.display(),
            dimension,
            fallback_dimension
        );
    }

    let index = FlatIndex::from_parts(dimension, body.ids, body.data).map_err(|e| {
        IndexError::from(PersistenceError::Format(FormatError::Inconsistent(e.to_string())))
    })?;
    info!("Loaded {} vectors from {} (Dim: {})", index.count(), path.display(), dimension);
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn save(index: &FlatIndex, path: &Path) {
        write(path, &encode(index).unwrap()).unwrap();
    }

    fn entries(index: &FlatIndex) -> HashMap<u64, Vec<u32>> {
        index
            .iter()
            .map(|(id, v)| (id, v.iter().map(|f| f.to_bits()).collect()))
            .collect()
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("index.eddy");

        let mut index = FlatIndex::new(3).unwrap();
        index.insert(&[vec![0.1, 0.2, 0.3], vec![-4.0, 5.5, 1e-30]], None, false).unwrap();
        index.insert(&[vec![7.0, 8.0, 9.0]], Some(&[100]), false).unwrap();
        index.remove(&[0]);

        save(&index, &path);
        let restored = load(&path, 3).unwrap();

        assert_eq!(restored.dimension(), 3);
        assert_eq!(entries(&restored), entries(&index));
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let index = load(&dir.path().join("absent.eddy"), 12).unwrap();
        assert_eq!(index.dimension(), 12);
        assert!(index.is_empty());
    }

    #[test]
    fn test_snapshot_dimension_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.eddy");
        save(&FlatIndex::new(5).unwrap(), &path);
        assert_eq!(load(&path, 9).unwrap().dimension(), 5);
    }

    #[test]
    fn test_corrupt_file_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.eddy");

        let mut index = FlatIndex::new(2).unwrap();
        index.insert(&[vec![1.0, 2.0], vec![3.0, 4.0]], None, false).unwrap();
        save(&index, &path);

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        let err = load(&path, 2).unwrap_err();
        assert!(matches!(err, IndexError::Persistence(_)));
        assert_eq!(err.kind(), "PersistenceError");

        fs::write(&path, b"definitely not a snapshot").unwrap();
        assert!(matches!(load(&path, 2), Err(IndexError::Persistence(_))));
    }
}
