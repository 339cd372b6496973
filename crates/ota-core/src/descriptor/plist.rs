//! `Info.plist` decoding for iOS packages.
//!
//! Accepts both XML and binary property lists; App Store tooling emits the
//! binary form, ad-hoc builds are often XML.

use std::io::Cursor;

use ::plist::{Dictionary, Value};
use ota_schema::AppDescriptor;

use super::{DescriptorDecoder, DescriptorError};
use crate::paths::INFO_PLIST_FILE;

const BUNDLE_IDENTIFIER: &str = "CFBundleIdentifier";
const SHORT_VERSION: &str = "CFBundleShortVersionString";
const BUNDLE_VERSION: &str = "CFBundleVersion";
const DISPLAY_NAME: &str = "CFBundleDisplayName";
const BUNDLE_NAME: &str = "CFBundleName";

#[derive(Debug, Clone, Copy, Default)]
pub struct PlistDecoder;

impl DescriptorDecoder for PlistDecoder {
    fn entry_name(&self) -> &'static str {
        INFO_PLIST_FILE
    }

    fn decode(&self, bytes: &[u8]) -> Result<AppDescriptor, DescriptorError> {
        let value = Value::from_reader(Cursor::new(bytes))?;
        let dict = value
            .as_dictionary()
            .ok_or(DescriptorError::NotADictionary)?;

        Ok(AppDescriptor {
            identifier: required(dict, BUNDLE_IDENTIFIER)?,
            version: required(dict, SHORT_VERSION)?,
            build_number: required(dict, BUNDLE_VERSION)?,
            display_name: string_value(dict, DISPLAY_NAME)
                .or_else(|| string_value(dict, BUNDLE_NAME)),
        })
    }
}

fn required(dict: &Dictionary, key: &'static str) -> Result<String, DescriptorError> {
    string_value(dict, key).ok_or(DescriptorError::MissingKey(key))
}

// Build numbers are occasionally stored as integers.
fn string_value(dict: &Dictionary, key: &str) -> Option<String> {
    let s = match dict.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}
