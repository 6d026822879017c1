use anyhow::{ensure, Result};
use clap::Parser;
use eddy_core::IndexConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Exact vector index with snapshot persistence")]
pub struct Args {
    /// Vector dimension for a fresh index (ignored when a snapshot exists)
    #[arg(short, long, env = "EDDY_DIMENSION", default_value_t = 2048)]
    pub dimension: usize,

    /// Snapshot loaded at startup and written by `snapshot` requests
    #[arg(short, long, env = "EDDY_INDEX_PATH", default_value = "./data/index.eddy")]
    pub index_path: PathBuf,

    /// Snapshot written on shutdown
    #[arg(short, long, env = "EDDY_BACKUP_PATH", default_value = "./data/backup/index.eddy")]
    pub backup_path: PathBuf,

    /// How long shutdown waits for in-flight mutations before skipping the snapshot
    #[arg(long, env = "EDDY_SHUTDOWN_TIMEOUT_MS", default_value_t = 5000)]
    pub shutdown_timeout_ms: u64,
}

impl Args {
    pub fn index_config(&self) -> Result<IndexConfig> {
        ensure!(self.dimension > 0, "dimension must be positive");
        Ok(IndexConfig {
            dimension: self.dimension,
            index_path: self.index_path.clone(),
            backup_path: self.backup_path.clone(),
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
        })
    }
}
