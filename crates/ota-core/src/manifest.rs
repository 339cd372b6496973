//! Install manifests and download links.
//!
//! iOS will only install an `.ipa` over the air through an `itms-services`
//! link pointing at a property-list manifest that names the binary and its
//! bundle metadata. Android installs the `.apk` from a plain URL, so no
//! document is produced for it.
//!
//! Manifests are serialized with `plist`, which escapes markup characters in
//! every string value.

use std::io;
use std::path::PathBuf;

use ota_schema::{AppDescriptor, BaseUrl, FileType, ITMS_DOWNLOAD_PREFIX};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ManifestPolicy;
use crate::io::atomic;
use crate::paths::{IPA_MANIFEST_FILE, ResourceDir};

/// `platform-identifier` for iPhone/iPad installs.
pub const PLATFORM_IDENTIFIER: &str = "com.apple.platform.iphoneos";

const ASSET_KIND: &str = "software-package";
const METADATA_KIND: &str = "software";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to serialize install manifest: {0}")]
    Render(#[source] plist::Error),

    #[error("Failed to write install manifest {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid install manifest: {0}")]
    Parse(#[source] plist::Error),
}

/// Root of an iOS install manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallManifest {
    pub items: Vec<ManifestItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub assets: Vec<ManifestAsset>,
    pub metadata: ManifestMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestAsset {
    pub kind: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestMetadata {
    pub bundle_identifier: String,
    pub bundle_version: String,
    pub kind: String,
    pub platform_identifier: String,
    pub title: String,
}

impl InstallManifest {
    /// Manifest declaring one software package at `asset_url`.
    pub fn new(descriptor: &AppDescriptor, asset_url: impl Into<String>) -> Self {
        Self {
            items: vec![ManifestItem {
                assets: vec![ManifestAsset {
                    kind: ASSET_KIND.to_string(),
                    url: asset_url.into(),
                }],
                metadata: ManifestMetadata {
                    bundle_identifier: descriptor.identifier.clone(),
                    bundle_version: descriptor.version.clone(),
                    kind: METADATA_KIND.to_string(),
                    platform_identifier: PLATFORM_IDENTIFIER.to_string(),
                    title: descriptor.title(),
                },
            }],
        }
    }

    /// Serialize as an XML property list.
    pub fn to_xml(&self) -> Result<Vec<u8>, ManifestError> {
        let mut buf = Vec::new();
        plist::to_writer_xml(&mut buf, self).map_err(ManifestError::Render)?;
        buf.push(b'\n');
        Ok(buf)
    }

    /// Parse a manifest previously produced by [`Self::to_xml`].
    pub fn from_xml(bytes: &[u8]) -> Result<Self, ManifestError> {
        plist::from_bytes(bytes).map_err(ManifestError::Parse)
    }

    /// URL of the first software-package asset.
    pub fn asset_url(&self) -> Option<&str> {
        self.items
            .first()?
            .assets
            .iter()
            .find(|a| a.kind == ASSET_KIND)
            .map(|a| a.url.as_str())
    }

    /// Recover the descriptor fields embedded in the first item.
    ///
    /// Build number and display name live only in the title, so a manifest
    /// whose title does not follow `Name [version(build)]` yields `None`.
    ///
    /// A display name equal to the identifier is indistinguishable from the
    /// identifier fallback and comes back as `None`. The recovered
    /// descriptor always has the same [`AppDescriptor::title`].
    pub fn descriptor(&self) -> Option<AppDescriptor> {
        let metadata = &self.items.first()?.metadata;
        let (name, version, build) = parse_title(&metadata.title)?;
        if version != metadata.bundle_version {
            return None;
        }

        Some(AppDescriptor {
            identifier: metadata.bundle_identifier.clone(),
            version: metadata.bundle_version.clone(),
            build_number: build.to_string(),
            display_name: (name != metadata.bundle_identifier).then(|| name.to_string()),
        })
    }
}

fn parse_title(title: &str) -> Option<(&str, &str, &str)> {
    let rest = title.strip_suffix(")]")?;
    let (name, inner) = rest.rsplit_once(" [")?;
    let (version, build) = inner.rsplit_once('(')?;
    Some((name, version, build))
}

/// Wrap an absolute manifest URL in the iOS install-trigger scheme.
pub fn itms_link(manifest_url: &str) -> String {
    format!("{ITMS_DOWNLOAD_PREFIX}{manifest_url}")
}

/// What the synthesizer produced for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesized {
    /// Link handed to the device.
    pub download_url: String,
    /// The manifest file, for IPA packages.
    pub manifest: Option<WrittenManifest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenManifest {
    pub path: PathBuf,
    pub url: String,
    /// `false` when the file on disk was already up to date.
    pub written: bool,
}

/// Builds download links, writing IPA manifests into resource directories.
#[derive(Debug, Clone)]
pub struct ManifestSynthesizer {
    base_url: BaseUrl,
    policy: ManifestPolicy,
}

impl ManifestSynthesizer {
    pub fn new(base_url: BaseUrl, policy: ManifestPolicy) -> Self {
        Self { base_url, policy }
    }

    /// Download link (and manifest, where the platform needs one) for a
    /// package of `file_type`.
    ///
    /// Returns `None` when no link can be produced: unknown packages, and
    /// IPAs whose descriptor could not be decoded.
    pub fn synthesize(
        &self,
        file_type: FileType,
        descriptor: Option<&AppDescriptor>,
        package_path: &str,
        resource: &ResourceDir,
    ) -> Result<Option<Synthesized>, ManifestError> {
        match (file_type, descriptor) {
            (FileType::Ipa, Some(descriptor)) => {
                self.ipa(descriptor, package_path, resource).map(Some)
            }
            (FileType::Apk, _) => Ok(Some(self.apk(package_path))),
            (FileType::Ipa, None) | (FileType::Unknown, _) => Ok(None),
        }
    }

    /// Write `manifest.plist` for an IPA and return its `itms-services` link.
    pub fn ipa(
        &self,
        descriptor: &AppDescriptor,
        package_path: &str,
        resource: &ResourceDir,
    ) -> Result<Synthesized, ManifestError> {
        let manifest = InstallManifest::new(descriptor, self.base_url.join(package_path));
        let bytes = manifest.to_xml()?;

        let path = resource.file(IPA_MANIFEST_FILE);
        let url = self.base_url.join(&resource.url_path(IPA_MANIFEST_FILE));

        let up_to_date =
            self.policy == ManifestPolicy::WhenChanged && atomic::matches_contents(&path, &bytes);
        if up_to_date {
            tracing::debug!("{} is up to date", path.display());
        } else {
            atomic::write_atomic(&path, &bytes).map_err(|source| ManifestError::Write {
                path: path.clone(),
                source,
            })?;
            tracing::info!("Wrote install manifest {}", path.display());
        }

        Ok(Synthesized {
            download_url: itms_link(&url),
            manifest: Some(WrittenManifest {
                path,
                url,
                written: !up_to_date,
            }),
        })
    }

    /// APKs are installed straight from their URL.
    pub fn apk(&self, package_path: &str) -> Synthesized {
        Synthesized {
            download_url: self.base_url.join(package_path),
            manifest: None,
        }
    }
}
