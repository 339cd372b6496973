//! Single-entry zip extraction
//!
//! Pulls one descriptor file (e.g. `Info.plist`) out of a package container
//! into the package's resource directory, at most once.

use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;
use zip::ZipArchive;
use zip::result::ZipError;

use super::atomic;

/// Largest descriptor entry we are willing to buffer.
pub const MAX_ENTRY_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// The container is missing, unreadable or not a zip archive.
    #[error("Cannot read archive {archive}: {source}")]
    ArchiveOpen {
        archive: String,
        #[source]
        source: ZipError,
    },

    /// The extracted entry could not be written to the resource directory.
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A full scan found no entry with the requested basename.
    #[error("No '{entry}' entry in {archive}")]
    MissingEntry { entry: String, archive: String },

    /// The matching entry exceeds [`ExtractOptions::max_entry_bytes`].
    #[error("Entry '{entry}' in {archive} is larger than {limit} bytes")]
    EntryTooLarge {
        entry: String,
        archive: String,
        limit: u64,
    },

    /// The scan ran past [`ExtractOptions::deadline`].
    #[error("Scanning {archive} exceeded its deadline")]
    Timeout { archive: String },
}

impl ExtractError {
    /// Returns `true` for failures that leave the descriptor unavailable but
    /// should not abort the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ArchiveOpen { .. } | Self::MissingEntry { .. } | Self::EntryTooLarge { .. }
        )
    }
}

/// Where a package container's bytes come from.
///
/// Implemented for filesystem paths; tests substitute in-memory sources to
/// observe how often the archive is opened.
pub trait ArchiveSource {
    type Reader: Read + Seek;

    /// Open a fresh reader positioned at the start of the archive.
    fn open(&self) -> io::Result<Self::Reader>;

    /// Human-readable location for logs and errors.
    fn location(&self) -> String;
}

impl ArchiveSource for Path {
    type Reader = File;

    fn open(&self) -> io::Result<File> {
        File::open(self)
    }

    fn location(&self) -> String {
        self.display().to_string()
    }
}

impl ArchiveSource for PathBuf {
    type Reader = File;

    fn open(&self) -> io::Result<File> {
        self.as_path().open()
    }

    fn location(&self) -> String {
        self.as_path().location()
    }
}

/// Limits applied while scanning an archive.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Abort the scan once this instant has passed.
    pub deadline: Option<Instant>,
    /// Refuse to extract entries larger than this.
    pub max_entry_bytes: u64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            deadline: None,
            max_entry_bytes: MAX_ENTRY_BYTES,
        }
    }
}

/// What [`extract_if_missing`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// The destination already existed; the archive was not opened.
    Cached,
    /// The entry was found and written.
    Extracted { bytes: u64 },
}

/// Extract the first entry whose basename equals `entry_name` into
/// `dest_dir/entry_name`, unless that file already exists.
///
/// Basenames are compared case-sensitively. On [`ExtractError::MissingEntry`]
/// the destination is left absent.
pub fn extract_if_missing<S: ArchiveSource + ?Sized>(
    source: &S,
    entry_name: &str,
    dest_dir: &Path,
    options: &ExtractOptions,
) -> Result<Extraction, ExtractError> {
    let dest = dest_dir.join(entry_name);
    if dest.exists() {
        tracing::debug!("{} already extracted", dest.display());
        return Ok(Extraction::Cached);
    }

    let archive_name = source.location();
    let open_err = |source: ZipError| ExtractError::ArchiveOpen {
        archive: archive_name.clone(),
        source,
    };

    let reader = source.open().map_err(|e| open_err(ZipError::Io(e)))?;
    let mut archive = ZipArchive::new(reader).map_err(open_err)?;

    for i in 0..archive.len() {
        if options.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ExtractError::Timeout {
                archive: archive_name,
            });
        }

        // Match on the central directory name; only the chosen entry is opened.
        let matches = archive
            .name_for_index(i)
            .is_some_and(|name| !name.ends_with('/') && basename(name) == entry_name);
        if !matches {
            continue;
        }

        let mut file = archive.by_index(i).map_err(open_err)?;

        if file.size() > options.max_entry_bytes {
            return Err(ExtractError::EntryTooLarge {
                entry: file.name().to_string(),
                archive: archive_name,
                limit: options.max_entry_bytes,
            });
        }

        // Buffer first so a corrupt entry never leaves a partial file behind.
        let mut buf = Vec::with_capacity(file.size() as usize);
        (&mut file)
            .take(options.max_entry_bytes + 1)
            .read_to_end(&mut buf)
            .map_err(|e| open_err(ZipError::Io(e)))?;
        if buf.len() as u64 > options.max_entry_bytes {
            return Err(ExtractError::EntryTooLarge {
                entry: file.name().to_string(),
                archive: archive_name,
                limit: options.max_entry_bytes,
            });
        }

        atomic::write_atomic(&dest, &buf).map_err(|source| ExtractError::Io {
            path: dest.clone(),
            source,
        })?;

        tracing::info!(
            "Extracted {} ({} bytes) from {archive_name}",
            file.name(),
            buf.len()
        );
        return Ok(Extraction::Extracted {
            bytes: buf.len() as u64,
        });
    }

    Err(ExtractError::MissingEntry {
        entry: entry_name.to_string(),
        archive: archive_name,
    })
}

fn basename(entry: &str) -> &str {
    entry.rsplit('/').next().unwrap_or(entry)
}
