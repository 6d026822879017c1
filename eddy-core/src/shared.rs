use crate::error::{IndexError, Result};
use crate::index::flat::FlatIndex;
use crate::index::{SearchResult, VectorIndex};
use crate::storage::snapshot;
use crossbeam_utils::Backoff;
use log::warn;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError, TryLockResult};
use std::thread;
use std::time::{Duration, Instant};

/// The index as shared between request handlers.
///
/// # Thread Safety
/// One `RwLock` guards the whole store. Mutations hold the write lock from
/// validation to the last pushed row; searches and snapshots hold the read
/// lock, so neither can observe a half-applied insert, update, or remove.
/// Snapshot file I/O happens after the read lock is released, but under
/// `snapshot_lock`, so renames land in the order the states were encoded.
pub struct SharedIndex {
    dimension: usize,
    inner: RwLock<FlatIndex>,
    snapshot_lock: Mutex<()>,
}

impl SharedIndex {
    pub fn new(index: FlatIndex) -> Self {
        Self {
            dimension: index.dimension(),
            inner: RwLock::new(index),
            snapshot_lock: Mutex::new(()),
        }
    }

    // A panicking writer can only have died before mutating (validation runs
    // first), so the poisoned state is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, FlatIndex> {
        self.inner.read().unwrap_or_else(|poisoned| {
            warn!("Index lock poisoned, continuing with recovered state");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, FlatIndex> {
        self.inner.write().unwrap_or_else(|poisoned| {
            warn!("Index lock poisoned, continuing with recovered state");
            poisoned.into_inner()
        })
    }

    // Guards no data; a panic mid-write leaves at worst a stray temp file.
    fn snapshot_guard(&self) -> MutexGuard<'_, ()> {
        self.snapshot_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn count(&self) -> usize {
        self.read().count()
    }

    pub fn insert(&self, vectors: &[Vec<f32>], ids: Option<&[u64]>, allow_overwrite: bool) -> Result<Vec<u64>> {
        self.write().insert(vectors, ids, allow_overwrite)
    }

    pub fn update(&self, vectors: &[Vec<f32>], ids: Option<&[u64]>) -> Result<Vec<u64>> {
        self.write().update(vectors, ids)
    }

    pub fn remove(&self, ids: &[u64]) -> usize {
        self.write().remove(ids)
    }

    pub fn search(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<SearchResult>> {
        self.read().search(queries, k)
    }

    /// Snapshots the index to `path`. Returns the number of entries written.
    pub fn save(&self, path: &Path) -> Result<usize> {
        let _writing = self.snapshot_guard();
        let (entries, bytes) = {
            let index = self.read();
            (index.count(), snapshot::encode(&index)?)
        };
        snapshot::write(path, &bytes)?;
        Ok(entries)
    }

    /// Like [`save`](Self::save), but gives up if the locks cannot be taken
    /// within `timeout` (e.g. a writer is stuck), without touching `path`.
    pub fn save_with_timeout(&self, path: &Path, timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;

        let _writing = acquire_before(deadline, timeout, || self.snapshot_lock.try_lock())?;
        let (entries, bytes) = {
            let index = acquire_before(deadline, timeout, || self.inner.try_read())?;
            (index.count(), snapshot::encode(&index)?)
        };

        snapshot::write(path, &bytes)?;
        Ok(entries)
    }
}

/// Retries `attempt` until it yields a guard or `deadline` passes.
fn acquire_before<G>(deadline: Instant, timeout: Duration, mut attempt: impl FnMut() -> TryLockResult<G>) -> Result<G> {
    let backoff = Backoff::new();
    loop {
        match attempt() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(IndexError::LockTimeout(timeout));
                }
                if backoff.is_completed() {
                    thread::sleep(Duration::from_millis(1));
                } else {
                    backoff.snooze();
                }
            }
        }
    }
}
