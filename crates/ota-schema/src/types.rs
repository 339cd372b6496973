//! Package, descriptor and classification types.

use serde::{Deserialize, Serialize};

/// Kind of mobile package, decided from the file extension alone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// iOS application archive (`.ipa`).
    Ipa,
    /// Android application package (`.apk`).
    Apk,
    /// Anything else; never processed.
    Unknown,
}

impl FileType {
    /// Classify a package path by its extension, ignoring case.
    ///
    /// Total: every input maps to exactly one variant.
    pub fn classify(path: &str) -> Self {
        match extension(path) {
            Some(ext) if ext.eq_ignore_ascii_case("ipa") => Self::Ipa,
            Some(ext) if ext.eq_ignore_ascii_case("apk") => Self::Apk,
            _ => Self::Unknown,
        }
    }

    /// Short lowercase label (`ipa`, `apk`, `unknown`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ipa => "ipa",
            Self::Apk => "apk",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last component of a `/`-separated path.
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Extension of the last path component, without the dot.
pub fn extension(path: &str) -> Option<&str> {
    basename(path).rsplit_once('.').map(|(_, ext)| ext)
}

/// Basename with its extension removed (`files/g/App.ipa` -> `App`).
pub fn file_stem(path: &str) -> &str {
    let name = basename(path);
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}

/// Normalized application identity decoded from a package descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppDescriptor {
    /// Bundle identifier (iOS) or package name (Android).
    pub identifier: String,
    /// Marketing version (`CFBundleShortVersionString` / `versionName`).
    pub version: String,
    /// Build number (`CFBundleVersion` / `versionCode`).
    pub build_number: String,
    /// Human-readable name, when the descriptor carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl AppDescriptor {
    /// Name to show for the app: the display name, else the identifier.
    pub fn title_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.identifier)
    }

    /// Install title in the form `Name [version(build)]`.
    pub fn title(&self) -> String {
        format!(
            "{} [{}({})]",
            self.title_name(),
            self.version,
            self.build_number
        )
    }
}

/// Outcome of descriptor decoding for one request.
///
/// Keeps "decoding failed" distinguishable from "nothing to decode".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetadataStatus {
    /// The package type carries no descriptor (unknown extension).
    #[default]
    NotApplicable,
    /// The descriptor was extracted and decoded.
    Available(AppDescriptor),
    /// Extraction or decoding failed; the package is still served.
    Unavailable {
        /// Human-readable cause, suitable for display.
        reason: String,
    },
}

impl MetadataStatus {
    /// The decoded descriptor, if any.
    pub fn descriptor(&self) -> Option<&AppDescriptor> {
        match self {
            Self::Available(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    /// Returns `true` if decoding was attempted and failed.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Result of processing one package request, handed to the rendering layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageArtifact {
    /// Package path relative to the document root (e.g. `files/beta/App.ipa`).
    pub path: String,
    /// Distribution group the package is listed under.
    pub distribution_group: String,
    /// Kind of package.
    pub file_type: FileType,
    /// Basename without extension; `None` for unknown types.
    pub file_name: Option<String>,
    /// Install link for the device; `None` until a link could be produced.
    pub download_url: Option<String>,
    /// Contents of `description.txt`, trimmed with `\n` line endings.
    pub description: Option<String>,
    /// Decoded app identity, or why it is missing.
    #[serde(default)]
    pub metadata: MetadataStatus,
}

impl PackageArtifact {
    /// Classify `path` and build an artifact with no processing outputs yet.
    pub fn new(path: impl Into<String>, distribution_group: impl Into<String>) -> Self {
        let path = path.into();
        let file_type = FileType::classify(&path);
        let file_name = match file_type {
            FileType::Unknown => None,
            FileType::Ipa | FileType::Apk => Some(file_stem(&path).to_string()),
        };

        Self {
            path,
            distribution_group: distribution_group.into(),
            file_type,
            file_name,
            download_url: None,
            description: None,
            metadata: MetadataStatus::NotApplicable,
        }
    }

    /// The decoded descriptor, if decoding succeeded.
    pub fn descriptor(&self) -> Option<&AppDescriptor> {
        self.metadata.descriptor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_case_insensitive() {
        assert_eq!(FileType::classify("files/g/App.ipa"), FileType::Ipa);
        assert_eq!(FileType::classify("files/g/App.IPA"), FileType::Ipa);
        assert_eq!(FileType::classify("files/g/app.Apk"), FileType::Apk);
        assert_eq!(FileType::classify("files/g/app.APK"), FileType::Apk);
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(FileType::classify("files/g/readme.txt"), FileType::Unknown);
        assert_eq!(FileType::classify("files/g/noext"), FileType::Unknown);
        assert_eq!(FileType::classify(""), FileType::Unknown);
        assert_eq!(FileType::classify("files/g/app.ipa.zip"), FileType::Unknown);
        // A dot in a directory name is not an extension.
        assert_eq!(FileType::classify("files/v1.ipa/readme"), FileType::Unknown);
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("files/g/App.ipa"), "App");
        assert_eq!(file_stem("My.App.apk"), "My.App");
        assert_eq!(file_stem("noext"), "noext");
    }

    #[test]
    fn test_new_artifact_unknown_has_no_name() {
        let artifact = PackageArtifact::new("files/g/notes.pdf", "g");
        assert_eq!(artifact.file_type, FileType::Unknown);
        assert!(artifact.file_name.is_none());
        assert_eq!(artifact.metadata, MetadataStatus::NotApplicable);
    }

    #[test]
    fn test_title_falls_back_to_identifier() {
        let mut descriptor = AppDescriptor {
            identifier: "com.example.app".to_string(),
            version: "1.2.3".to_string(),
            build_number: "45".to_string(),
            display_name: Some("Example".to_string()),
        };
        assert_eq!(descriptor.title(), "Example [1.2.3(45)]");

        descriptor.display_name = None;
        assert_eq!(descriptor.title(), "com.example.app [1.2.3(45)]");
    }

    #[test]
    fn test_metadata_status_serialization() {
        let status = MetadataStatus::Unavailable {
            reason: "missing Info.plist".to_string(),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(
            json,
            r#"{"status":"unavailable","reason":"missing Info.plist"}"#
        );

        let back: MetadataStatus = serde_json::from_str(&json).unwrap();
        assert!(back.is_unavailable());
    }
}
