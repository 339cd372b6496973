pub mod cache;
pub mod config;
pub mod descriptor;
pub mod distributor;
pub mod io;
pub mod lock;
pub mod manifest;
pub mod paths;

pub use config::{ManifestPolicy, OtaConfig};
pub use descriptor::{DecoderRegistry, DescriptorDecoder, DescriptorError};
pub use distributor::{Distributor, ProcessError};
pub use manifest::{InstallManifest, ManifestSynthesizer};
