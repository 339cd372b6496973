//! Decode command

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use ota_core::DecoderRegistry;
use ota_schema::AppDescriptor;

use super::{descriptor_rows, print_rows};

/// Decode a descriptor file already extracted from a package
pub fn decode(file: &Path, json: bool) -> Result<()> {
    let descriptor = decode_file(&DecoderRegistry::new(), file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
    } else {
        print_rows(&descriptor.title(), &descriptor_rows(&descriptor));
    }
    Ok(())
}

/// Pick the decoder whose entry name matches the file name, then decode.
pub fn decode_file(registry: &DecoderRegistry, file: &Path) -> Result<AppDescriptor> {
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid file name: {}", file.display()))?;
    let decoder = registry.by_entry_name(name).with_context(|| {
        format!("Don't know how to decode '{name}' (expected Info.plist or AndroidManifest.xml)")
    })?;

    tracing::debug!("Decoding {} with the {} decoder", file.display(), decoder.entry_name());
    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    decoder
        .decode(&bytes)
        .with_context(|| format!("Failed to decode {}", file.display()))
}
