use crate::error::Result;
use crate::shared::SharedIndex;
use crate::storage::snapshot;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Everything the index needs from the process configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexConfig {
    /// Used only when no snapshot exists yet.
    pub dimension: usize,
    /// Loaded at startup, written by explicit snapshots.
    pub index_path: PathBuf,
    /// Written by the final snapshot at shutdown.
    pub backup_path: PathBuf,
    /// Upper bound on waiting for the index lock during shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: 2048,
            index_path: PathBuf::from("./data/index.eddy"),
            backup_path: PathBuf::from("./data/backup/index.eddy"),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of the shutdown snapshot. Never an error: exit must proceed.
#[derive(Debug)]
pub enum ShutdownReport {
    Saved { path: PathBuf, entries: usize },
    Skipped { reason: String },
}

impl ShutdownReport {
    pub fn is_saved(&self) -> bool {
        matches!(self, ShutdownReport::Saved { .. })
    }
}

/// Owns the index between process startup and shutdown.
///
/// The shutdown snapshot is an explicit call made by whoever sequences the
/// process exit (signal handler, end of input), not an at-exit registration.
pub struct IndexLifecycle {
    config: IndexConfig,
    index: Arc<SharedIndex>,
}

impl IndexLifecycle {
    /// Loads the snapshot at `config.index_path`, or starts empty.
    ///
    /// # Errors
    /// A snapshot that exists but is unreadable or corrupt aborts startup.
    pub fn open(config: IndexConfig) -> Result<Self> {
        info!("Opening index from {}", config.index_path.display());
        let index = snapshot::load(&config.index_path, config.dimension)?;
        Ok(Self {
            config,
            index: Arc::new(SharedIndex::new(index)),
        })
    }

    pub fn index(&self) -> Arc<SharedIndex> {
        self.index.clone()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Writes the current state to the primary index path. Backs the
    /// `snapshot` request.
    pub fn snapshot(&self) -> Result<PathBuf> {
        let entries = self.index.save(&self.config.index_path)?;
        info!("Snapshot of {} vectors saved to {}", entries, self.config.index_path.display());
        Ok(self.config.index_path.clone())
    }

    /// Best-effort final snapshot to the backup path.
    ///
    /// Concurrent handlers may still be running; whatever state the lock
    /// admits first is what gets written. Failures are logged and reported.
    pub fn shutdown(&self) -> ShutdownReport {
        let path = self.config.backup_path.clone();
        info!("Shutdown: writing final snapshot to {}", path.display());

        match self.index.save_with_timeout(&path, self.config.shutdown_timeout) {
            Ok(entries) => {
                info!("Shutdown snapshot complete ({} vectors)", entries);
                ShutdownReport::Saved { path, entries }
            }
            Err(e @ crate::IndexError::LockTimeout(_)) => {
                warn!("Shutdown snapshot skipped: {}", e);
                ShutdownReport::Skipped { reason: e.to_string() }
            }
            Err(e) => {
                error!("Shutdown snapshot failed: {}", e);
                ShutdownReport::Skipped { reason: e.to_string() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn config_in(dir: &std::path::Path) -> IndexConfig {
        IndexConfig {
            dimension: 4,
            index_path: dir.join("index.eddy"),
            backup_path: dir.join("backup").join("index.eddy"),
            shutdown_timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_restart_recovers_backup() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());

        let lifecycle = IndexLifecycle::open(config.clone()).unwrap();
        let index = lifecycle.index();
        index.insert(&[vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]], None, false).unwrap();
        let report = lifecycle.shutdown();
        assert!(report.is_saved());

        // Next start reads the backup as its primary snapshot.
        let restarted = IndexLifecycle::open(IndexConfig {
            index_path: config.backup_path.clone(),
            ..config
        })
        .unwrap();
        let res = restarted.index().search(&[vec![0.0, 1.0, 0.0, 0.0]], 1).unwrap();
        assert_eq!(res[0].ids, vec![1]);
        assert_eq!(restarted.index().count(), 2);
    }

    #[test]
    fn test_explicit_snapshot_writes_index_path() {
        let dir = tempdir().unwrap();
        let lifecycle = IndexLifecycle::open(config_in(dir.path())).unwrap();
        lifecycle.index().insert(&[vec![0.5; 4]], None, false).unwrap();

        let path = lifecycle.snapshot().unwrap();
        assert_eq!(path, dir.path().join("index.eddy"));
        let reopened = IndexLifecycle::open(config_in(dir.path())).unwrap();
        assert_eq!(reopened.index().count(), 1);
    }

    #[test]
    fn test_corrupt_snapshot_aborts_open() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        fs::write(&config.index_path, b"garbage").unwrap();
        assert!(IndexLifecycle::open(config).is_err());
    }

    #[test]
    fn test_shutdown_failure_is_reported_not_raised() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path());
        // A regular file where the backup directory should be.
        fs::write(dir.path().join("blocker"), b"x").unwrap();
        config.backup_path = dir.path().join("blocker").join("index.eddy");

        let lifecycle = IndexLifecycle::open(config).unwrap();
        assert!(matches!(lifecycle.shutdown(), ShutdownReport::Skipped { .. }));
    }
}
