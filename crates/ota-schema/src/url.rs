//! Validated base URL newtype.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Errors produced when validating a [`BaseUrl`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BaseUrlError {
    /// The URL does not start with `http://` or `https://`.
    #[error("Invalid base URL '{0}': must start with http:// or https://")]
    Scheme(String),

    /// The URL has a scheme but no host.
    #[error("Invalid base URL '{0}': missing host")]
    MissingHost(String),
}

/// Scheme + host (and optional path prefix) packages are served from.
///
/// Always ends with `/`, so relative package paths can be appended directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BaseUrl(String);

impl BaseUrl {
    /// Validate and normalize a base URL.
    ///
    /// # Errors
    ///
    /// Returns [`BaseUrlError::Scheme`] unless the URL is `http` or `https`,
    /// and [`BaseUrlError::MissingHost`] if nothing follows the scheme.
    pub fn parse(s: &str) -> Result<Self, BaseUrlError> {
        let s = s.trim();
        let rest = s
            .strip_prefix("https://")
            .or_else(|| s.strip_prefix("http://"))
            .ok_or_else(|| BaseUrlError::Scheme(s.to_string()))?;

        if rest.trim_start_matches('/').is_empty() || rest.starts_with('/') {
            return Err(BaseUrlError::MissingHost(s.to_string()));
        }

        let mut url = s.to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        Ok(Self(url))
    }

    /// Build a base URL from the request's host and TLS flag.
    ///
    /// # Errors
    ///
    /// Returns [`BaseUrlError::MissingHost`] if `host` is empty.
    pub fn from_host(host: &str, tls: bool) -> Result<Self, BaseUrlError> {
        let scheme = if tls { "https" } else { "http" };
        Self::parse(&format!("{scheme}://{host}"))
    }

    /// Append a document-root-relative path.
    pub fn join(&self, relative: &str) -> String {
        format!("{}{}", self.0, relative.trim_start_matches('/'))
    }

    /// Return the URL as a string slice (with trailing slash).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BaseUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for BaseUrl {
    type Err = BaseUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for BaseUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
