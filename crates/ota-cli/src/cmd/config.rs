//! Config command and configuration resolution

use std::path::Path;

use anyhow::{Context, Result};
use ota_core::OtaConfig;
use ota_core::config::ENV_BASE_URL;
use ota_schema::BaseUrl;

/// Configuration sources given on the command line.
///
/// Precedence: flags, then `OTA_*` variables, then the config file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides<'a> {
    pub file: Option<&'a Path>,
    pub base_url: Option<&'a str>,
    pub root: Option<&'a Path>,
}

impl Overrides<'_> {
    pub fn resolve(&self) -> Result<OtaConfig> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    pub fn resolve_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<OtaConfig> {
        let mut config = match (self.file, self.base_url) {
            (Some(path), _) => {
                tracing::debug!("Loading configuration from {}", path.display());
                OtaConfig::load(path)?.with_overrides(&lookup)?
            }
            (None, Some(url)) => {
                OtaConfig::new(BaseUrl::parse(url).context("--base-url")?, ".")
                    .with_overrides(&lookup)?
            }
            (None, None) => OtaConfig::from_lookup(&lookup)?.with_context(|| {
                format!("No base URL configured: pass --base-url, set {ENV_BASE_URL} or use --config")
            })?,
        };

        if let Some(url) = self.base_url {
            config.base_url = BaseUrl::parse(url).context("--base-url")?;
        }
        if let Some(root) = self.root {
            config.root = root.to_path_buf();
        }
        config.validate()?;
        tracing::debug!("Serving {} from {}", config.base_url, config.root.display());
        Ok(config)
    }
}

/// Print the resolved configuration as TOML
pub fn show(config: &OtaConfig) -> Result<()> {
    let text = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    print!("{text}");
    Ok(())
}
