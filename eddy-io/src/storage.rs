use log::{debug, info, warn};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("Path has no file name: {0}")]
    NoFileName(PathBuf),
    #[error("Failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("Failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("Failed to rename {from} to {to}: {source}")]
    Rename { from: PathBuf, to: PathBuf, source: io::Error },
    #[error("Failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

/// Distinguishes concurrent writers targeting the same path.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

fn temp_path_for(path: &Path) -> Result<PathBuf, IoError> {
    let name = path
        .file_name()
        .ok_or_else(|| IoError::NoFileName(path.to_path_buf()))?;
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);

    let mut tmp = OsString::from(".");
    tmp.push(name);
    tmp.push(format!(".{}.{}.tmp", std::process::id(), seq));
    Ok(path.with_file_name(tmp))
}

/// Replaces the file at `path` with `bytes` so that readers observe either
/// the previous content or the new content, never a partial write.
///
/// # Logic
/// 1. Creates missing parent directories.
/// 2. Writes a sibling temp file and `fsync`s it.
/// 3. Renames it over `path` (atomic on POSIX within one filesystem).
/// 4. `fsync`s the parent directory so the rename itself is durable.
///
/// # Errors
/// The temp file is removed on any failure; `path` is left untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IoError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => Some(p),
        _ => None,
    };
    if let Some(dir) = parent {
        fs::create_dir_all(dir).map_err(|source| IoError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let tmp = temp_path_for(path)?;
    if let Err(e) = write_synced(&tmp, bytes) {
        discard(&tmp);
        return Err(IoError::Write { path: tmp, source: e });
    }

    if let Err(source) = fs::rename(&tmp, path) {
        discard(&tmp);
        return Err(IoError::Rename {
            from: tmp,
            to: path.to_path_buf(),
            source,
        });
    }

    if let Some(dir) = parent {
        sync_dir(dir);
    }

    info!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn discard(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove temp file {}: {}", tmp.display(), e);
        }
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    // Best effort: some filesystems refuse fsync on directories.
    match File::open(dir).and_then(|d| d.sync_all()) {
        Ok(()) => {}
        Err(e) => debug!("Directory fsync skipped for {}: {}", dir.display(), e),
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

/// Reads the whole file, returning `None` when it does not exist.
///
/// Any other failure (permissions, a directory in the way) is an error: the
/// caller must be able to tell "nothing saved yet" from "cannot read what was
/// saved".
pub fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, IoError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(IoError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}
