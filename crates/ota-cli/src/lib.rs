//! ota - over-the-air package metadata
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Developer front-end for the `ota-core` pipeline: run it against a package
//! under a document root and see exactly what a device would be handed.
//!
//! # Directory Layout
//!
//! ```text
//! {root}/
//! ├── files/beta/App.ipa
//! └── files/beta/App/
//!     ├── description.txt
//!     ├── Info.plist
//!     └── manifest.plist
//! ```

pub mod cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ota")]
#[command(author, version, about = "ota - over-the-air install metadata for IPA and APK packages")]
pub struct Cli {
    /// Path to an ota.toml configuration file
    #[arg(long, global = true, env = "OTA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Scheme + host packages are served from (e.g. https://dist.example.com/)
    #[arg(long, global = true, env = "OTA_BASE_URL")]
    pub base_url: Option<String>,

    /// Document root package paths are relative to
    #[arg(long, global = true, env = "OTA_ROOT")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Process a package and show its install metadata
    Inspect {
        /// Package path relative to the document root (e.g. files/beta/App.ipa)
        path: String,
        /// Distribution group the package is listed under
        #[arg(short, long, default_value = "default")]
        group: String,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decode an extracted Info.plist or AndroidManifest.xml
    Decode {
        /// Descriptor file; its name selects the decoder
        file: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the resolved configuration
    Config,
}
