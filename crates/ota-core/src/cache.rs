//! Per-package resource directories.
//!
//! Each package gets `files/{group}/{name}/`, holding an editable
//! `description.txt` next to whatever the pipeline extracts or generates.
//! Both operations here are idempotent and safe to race.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ota_schema::DEFAULT_DESCRIPTION;
use thiserror::Error;

use crate::io::atomic;
use crate::paths::DESCRIPTION_FILE;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to create directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to prepare description {}: {source}", path.display())]
    Description {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Create `path` (and parents) unless it already exists.
///
/// A directory created concurrently by another request is not an error.
pub fn ensure_directory(path: &Path) -> Result<(), CacheError> {
    if path.is_dir() {
        return Ok(());
    }

    match fs::create_dir_all(path) {
        Ok(()) => {
            tracing::debug!("Created resource directory {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(source) => Err(CacheError::Directory {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Return the package description, creating the placeholder on first use.
///
/// Existing content is never overwritten. The returned text has trailing
/// whitespace removed and `\r\n` / `\r` line endings folded to `\n`.
pub fn ensure_description(dir: &Path) -> Result<String, CacheError> {
    let path = dir.join(DESCRIPTION_FILE);
    let err = |source| CacheError::Description {
        path: path.clone(),
        source,
    };

    if atomic::create_atomic(&path, DEFAULT_DESCRIPTION.as_bytes()).map_err(err)? {
        tracing::debug!("Wrote default description to {}", path.display());
    }

    let raw = fs::read(&path).map_err(err)?;
    Ok(normalize_description(&String::from_utf8_lossy(&raw)))
}

/// Trim trailing whitespace and normalize line endings for display.
pub fn normalize_description(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .trim_end()
        .to_string()
}
