// src/download/integrity.rs

//! Sanity gate for downloaded server cores.
//!
//! A core jar is a zip archive, so anything smaller than a kilobyte or not
//! starting with the local-file-header magic `PK` is almost certainly an
//! error page or a truncated transfer.

use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::fs::FileSystem;

pub const MIN_CORE_SIZE: u64 = 1024;
pub const ZIP_MAGIC: [u8; 2] = *b"PK";

#[derive(Error, Debug)]
pub enum IntegrityError {
    #[error("{path:?} is only {size} bytes; a server core is at least {min}", min = MIN_CORE_SIZE)]
    TooSmall { path: PathBuf, size: u64 },

    #[error("{path:?} does not start with zip magic (found {found:02x?})")]
    BadMagic { path: PathBuf, found: [u8; 2] },

    #[error("cannot read {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Check that `path` looks like a server core. Does not modify the file.
pub fn validate_core_file(fs: &dyn FileSystem, path: &Path) -> Result<(), IntegrityError> {
    let unreadable = |source: anyhow::Error| IntegrityError::Unreadable {
        path: path.to_path_buf(),
        source,
    };

    let size = fs.file_len(path).map_err(unreadable)?;
    if size < MIN_CORE_SIZE {
        return Err(IntegrityError::TooSmall {
            path: path.to_path_buf(),
            size,
        });
    }

    let mut reader = fs.open_read(path).map_err(unreadable)?;
    let mut found = [0u8; 2];
    reader
        .read_exact(&mut found)
        .map_err(|e| unreadable(e.into()))?;
    if found != ZIP_MAGIC {
        return Err(IntegrityError::BadMagic {
            path: path.to_path_buf(),
            found,
        });
    }

    Ok(())
}

/// Validate `path` and delete it if it is rejected.
///
/// A file that could not be read at all is left alone.
pub fn accept_core_file(fs: &dyn FileSystem, path: &Path) -> Result<(), IntegrityError> {
    match validate_core_file(fs, path) {
        Ok(()) => {
            info!(path = ?path, "core file passed integrity check");
            Ok(())
        }
        Err(err @ IntegrityError::Unreadable { .. }) => Err(err),
        Err(err) => {
            warn!(path = ?path, error = %err, "core file rejected; deleting");
            if let Err(e) = fs.remove_file(path) {
                warn!(path = ?path, error = %e, "failed to delete rejected core file");
            }
            Err(err)
        }
    }
}
