//! Cache layout and request path validation.
//!
//! Layout, relative to the document root:
//!
//! ```text
//! files/{group}/{name}/
//! ├── description.txt      # editable, created once
//! ├── Info.plist           # IPA: extracted once
//! ├── AndroidManifest.xml  # APK: extracted once
//! └── manifest.plist       # IPA: install manifest
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Editable description next to the cached descriptor.
pub const DESCRIPTION_FILE: &str = "description.txt";

/// Descriptor entry inside an `.ipa`.
pub const INFO_PLIST_FILE: &str = "Info.plist";

/// Descriptor entry inside an `.apk`.
pub const ANDROID_MANIFEST_FILE: &str = "AndroidManifest.xml";

/// Generated iOS install manifest.
pub const IPA_MANIFEST_FILE: &str = "manifest.plist";

/// Default cache directory under the document root.
pub const DEFAULT_FILES_DIR: &str = "files";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PathError {
    #[error("Path must be relative: '{0}'")]
    Absolute(String),

    #[error("Path must not contain '..' or empty segments: '{0}'")]
    Traversal(String),

    #[error("Invalid path segment: '{0}'")]
    Segment(String),
}

/// Check a document-root-relative request path.
pub fn validate_relative(path: &str) -> Result<(), PathError> {
    if path.starts_with('/') || path.starts_with('\\') || path.contains(':') {
        return Err(PathError::Absolute(path.to_string()));
    }
    if path.is_empty()
        || path
            .split(['/', '\\'])
            .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(PathError::Traversal(path.to_string()));
    }
    Ok(())
}

/// Check a single path segment (group or package name).
pub fn validate_segment(segment: &str) -> Result<(), PathError> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0'])
    {
        return Err(PathError::Segment(segment.to_string()));
    }
    Ok(())
}

/// Document-root-relative resource directory: `{files_dir}/{group}/{name}`.
pub fn resource_dir(files_dir: &str, group: &str, name: &str) -> String {
    format!("{}/{group}/{name}", files_dir.trim_end_matches('/'))
}

/// A package's resource directory, both on disk and as a URL path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDir {
    path: PathBuf,
    rel: String,
}

impl ResourceDir {
    /// `rel` is relative to `root`, which is also the URL root.
    pub fn new(root: &Path, rel: impl Into<String>) -> Self {
        let rel = rel.into();
        Self {
            path: root.join(&rel),
            rel,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rel(&self) -> &str {
        &self.rel
    }

    /// On-disk path of a file inside the directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Document-root-relative path of a file inside the directory.
    pub fn url_path(&self, name: &str) -> String {
        format!("{}/{name}", self.rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_dir_locations() {
        let res = ResourceDir::new(Path::new("/srv/www"), resource_dir("files", "beta", "App"));
        assert_eq!(res.path(), Path::new("/srv/www/files/beta/App"));
        assert_eq!(res.file(IPA_MANIFEST_FILE), Path::new("/srv/www/files/beta/App/manifest.plist"));
        assert_eq!(res.url_path(IPA_MANIFEST_FILE), "files/beta/App/manifest.plist");
    }

    #[test]
    fn test_resource_dir() {
        assert_eq!(resource_dir("files", "beta", "App"), "files/beta/App");
        assert_eq!(resource_dir("files/", "beta", "App"), "files/beta/App");
    }

    #[test]
    fn test_validate_relative() {
        assert!(validate_relative("files/beta/App.ipa").is_ok());
        assert_eq!(
            validate_relative("/etc/passwd"),
            Err(PathError::Absolute("/etc/passwd".to_string()))
        );
        assert!(validate_relative("C:/x.ipa").is_err());
        assert!(validate_relative("files/../secret.ipa").is_err());
        assert!(validate_relative("files//App.ipa").is_err());
        assert!(validate_relative("").is_err());
    }

    #[test]
    fn test_validate_segment() {
        assert!(validate_segment("beta").is_ok());
        assert!(validate_segment("My.App").is_ok());
        assert!(validate_segment("").is_err());
        assert!(validate_segment("..").is_err());
        assert!(validate_segment("a/b").is_err());
    }
}
