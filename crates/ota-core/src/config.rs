//! Runtime configuration.
//!
//! The serving host is configuration, never read from the request: it is
//! loaded from an `ota.toml` and/or `OTA_*` environment variables.
//!
//! ```toml
//! base_url = "https://dist.example.com/"
//! root = "/srv/www"
//! files_dir = "files"
//! timeout_secs = 30
//! manifest_policy = "when_changed"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use ota_schema::BaseUrl;
use serde::{Deserialize, Serialize};

use crate::paths::{self, DEFAULT_FILES_DIR};

pub const ENV_BASE_URL: &str = "OTA_BASE_URL";
pub const ENV_ROOT: &str = "OTA_ROOT";
pub const ENV_FILES_DIR: &str = "OTA_FILES_DIR";
pub const ENV_TIMEOUT_SECS: &str = "OTA_TIMEOUT_SECS";
pub const ENV_MANIFEST_POLICY: &str = "OTA_MANIFEST_POLICY";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// When to rewrite an IPA's `manifest.plist`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ManifestPolicy {
    /// Rewrite on every request.
    Always,
    /// Rewrite only when the rendered document differs from the file on
    /// disk (new host, new descriptor).
    #[default]
    WhenChanged,
}

impl std::str::FromStr for ManifestPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "always" => Ok(Self::Always),
            "when_changed" => Ok(Self::WhenChanged),
            other => anyhow::bail!("Unknown manifest policy '{other}'"),
        }
    }
}

/// Settings shared by every request handled by a [`crate::Distributor`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OtaConfig {
    /// Scheme + host packages are served from.
    pub base_url: BaseUrl,
    /// Document root; package paths and `files_dir` are relative to it.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Cache directory under `root`.
    #[serde(default = "default_files_dir")]
    pub files_dir: String,
    /// Upper bound for one request's filesystem and archive work.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub manifest_policy: ManifestPolicy,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_files_dir() -> String {
    DEFAULT_FILES_DIR.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl OtaConfig {
    /// Defaults for everything but the host and document root.
    pub fn new(base_url: BaseUrl, root: impl Into<PathBuf>) -> Self {
        Self {
            base_url,
            root: root.into(),
            files_dir: default_files_dir(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            manifest_policy: ManifestPolicy::default(),
        }
    }

    /// Read and validate an `ota.toml` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML for
    /// this schema, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Parse and validate TOML configuration text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from `OTA_*` variables alone, read through
    /// `lookup`.
    ///
    /// Returns `None` when `OTA_BASE_URL` is not set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let Some(base_url) = lookup(ENV_BASE_URL) else {
            return Ok(None);
        };
        let base_url = BaseUrl::parse(&base_url).context(ENV_BASE_URL)?;
        Self::new(base_url, default_root())
            .with_overrides(lookup)
            .map(Some)
    }

    /// Apply overrides read through `lookup`, then validate.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = BaseUrl::parse(&url).context(ENV_BASE_URL)?;
        }
        if let Some(root) = lookup(ENV_ROOT) {
            self.root = PathBuf::from(root);
        }
        if let Some(files_dir) = lookup(ENV_FILES_DIR) {
            self.files_dir = files_dir;
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            self.timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("{ENV_TIMEOUT_SECS} must be a number of seconds"))?;
        }
        if let Some(policy) = lookup(ENV_MANIFEST_POLICY) {
            self.manifest_policy = policy.parse()?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than zero");
        }
        paths::validate_relative(&self.files_dir).context("files_dir")?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
