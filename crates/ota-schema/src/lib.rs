//! Shared types for OTA package metadata.
//!
//! These are the values the pipeline in `ota-core` produces and the
//! rendering layer consumes, so they carry `serde` derives throughout.

pub mod types;
pub mod url;

// Re-exports
pub use types::*;
pub use url::{BaseUrl, BaseUrlError};

/// Scheme prefix that makes iOS fetch an install manifest.
pub const ITMS_DOWNLOAD_PREFIX: &str = "itms-services://?action=download-manifest&url=";

/// Placeholder written to a fresh `description.txt`.
pub const DEFAULT_DESCRIPTION: &str = "description";
