//! Package descriptor decoding.
//!
//! Every package format ships one identifying file inside its container.
//! A [`DescriptorDecoder`] names that entry and turns its raw bytes into an
//! [`AppDescriptor`]; the [`DecoderRegistry`] maps each [`FileType`] to its
//! decoder so the pipeline never matches on formats itself.

pub mod axml;
pub mod plist;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ota_schema::{AppDescriptor, FileType};
use thiserror::Error;

pub use self::axml::BinaryXmlDecoder;
pub use self::plist::PlistDecoder;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("Invalid property list: {0}")]
    Plist(#[from] ::plist::Error),

    #[error("Property list root is not a dictionary")]
    NotADictionary,

    #[error("Missing required key '{0}'")]
    MissingKey(&'static str),

    #[error("Malformed binary XML at offset {offset:#x}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("Binary XML has no <manifest> element")]
    NoManifestElement,
}

impl DescriptorError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            offset,
            reason: reason.into(),
        }
    }
}

/// Turns a package's raw descriptor bytes into an [`AppDescriptor`].
pub trait DescriptorDecoder: Send + Sync + fmt::Debug {
    /// Basename of the container entry holding the descriptor.
    fn entry_name(&self) -> &'static str;

    /// Decode raw bytes as read from the container.
    fn decode(&self, bytes: &[u8]) -> Result<AppDescriptor, DescriptorError>;
}

/// Decoders keyed by package type.
#[derive(Debug, Clone, Default)]
pub struct DecoderRegistry {
    decoders: HashMap<FileType, Arc<dyn DescriptorDecoder>>,
}

impl DecoderRegistry {
    /// Registry with the built-in IPA and APK decoders.
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.register(FileType::Ipa, PlistDecoder);
        registry.register(FileType::Apk, BinaryXmlDecoder);
        registry
    }

    /// Install (or replace) the decoder for `file_type`.
    pub fn register(&mut self, file_type: FileType, decoder: impl DescriptorDecoder + 'static) {
        self.decoders.insert(file_type, Arc::new(decoder));
    }

    /// Decoder for `file_type`, if one is registered.
    pub fn get(&self, file_type: FileType) -> Option<&dyn DescriptorDecoder> {
        self.decoders.get(&file_type).map(Arc::as_ref)
    }

    /// Decoder whose entry name equals `name` (e.g. `Info.plist`).
    pub fn by_entry_name(&self, name: &str) -> Option<&dyn DescriptorDecoder> {
        self.decoders
            .values()
            .find(|d| d.entry_name() == name)
            .map(Arc::as_ref)
    }
}
