//! Atomic file writes.
//!
//! Every write goes to a temporary file in the destination directory and is
//! then renamed into place, so concurrent readers see either the old file or
//! the complete new one.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

fn temp_beside(path: &Path) -> io::Result<NamedTempFile> {
    let dir = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        )
    })?;
    tempfile::Builder::new()
        .prefix(".ota-")
        .suffix(".tmp")
        .tempfile_in(dir)
}

/// Atomically replace `path` with `contents`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp = temp_beside(path)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Atomically create `path` with `contents` unless it already exists.
///
/// Returns `Ok(false)` when another writer got there first; the existing
/// file is left untouched.
pub fn create_atomic(path: &Path, contents: &[u8]) -> io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }

    let mut tmp = temp_beside(path)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error),
    }
}

/// Returns `true` if `path` holds exactly `contents`.
pub fn matches_contents(path: &Path, contents: &[u8]) -> bool {
    fs::read(path).is_ok_and(|existing| existing == contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_atomic_replaces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.plist");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_create_atomic_never_clobbers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("description.txt");

        assert!(create_atomic(&path, b"description").unwrap());
        assert!(!create_atomic(&path, b"other").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "description");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Info.plist");

        write_atomic(&path, b"payload").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("Info.plist")]);
    }

    #[test]
    fn test_missing_parent_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent").join("file.txt");
        assert!(write_atomic(&path, b"x").is_err());
    }

    #[test]
    fn test_matches_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        assert!(!matches_contents(&path, b"a"));
        fs::write(&path, b"a").unwrap();
        assert!(matches_contents(&path, b"a"));
        assert!(!matches_contents(&path, b"b"));
    }
}
