//! Android binary XML (`AndroidManifest.xml`) decoding.
//!
//! APKs ship the manifest compiled by `aapt`/`aapt2` into a chunked binary
//! document: a `RES_XML_TYPE` header followed by a string pool, an optional
//! resource-id map, and a stream of namespace/element chunks. Only what is
//! needed to identify the app is decoded: attributes of `<manifest>` and a
//! literal `android:label` on `<application>`.
//!
//! All integers are little-endian. Chunk layout:
//!
//! ```text
//! u16 type | u16 header_size | u32 size | header rest ... | body ...
//! ```

use ota_schema::AppDescriptor;

use super::{DescriptorDecoder, DescriptorError};
use crate::paths::ANDROID_MANIFEST_FILE;

const RES_STRING_POOL_TYPE: u16 = 0x0001;
const RES_XML_TYPE: u16 = 0x0003;
const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;

const CHUNK_HEADER_SIZE: usize = 8;
const STRING_POOL_HEADER_SIZE: usize = 28;
const ATTRIBUTE_MIN_SIZE: usize = 20;
const UTF8_FLAG: u32 = 1 << 8;
const NO_INDEX: u32 = 0xFFFF_FFFF;

// Res_value data types.
const TYPE_REFERENCE: u8 = 0x01;
const TYPE_STRING: u8 = 0x03;
const TYPE_FLOAT: u8 = 0x04;
const TYPE_INT_DEC: u8 = 0x10;
const TYPE_INT_HEX: u8 = 0x11;
const TYPE_INT_BOOLEAN: u8 = 0x12;

// Framework attribute ids, used when aapt2 strips attribute names.
const ATTR_LABEL: u32 = 0x0101_0001;
const ATTR_VERSION_CODE: u32 = 0x0101_021b;
const ATTR_VERSION_NAME: u32 = 0x0101_021c;

#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryXmlDecoder;

impl DescriptorDecoder for BinaryXmlDecoder {
    fn entry_name(&self) -> &'static str {
        ANDROID_MANIFEST_FILE
    }

    fn decode(&self, bytes: &[u8]) -> Result<AppDescriptor, DescriptorError> {
        let manifest = ManifestAttributes::parse(bytes)?;
        let identifier = manifest
            .package
            .ok_or(DescriptorError::MissingKey("package"))?;

        Ok(AppDescriptor {
            identifier,
            version: manifest.version_name.unwrap_or_default(),
            build_number: manifest.version_code.unwrap_or_default(),
            display_name: manifest.label,
        })
    }
}

/// Identity attributes pulled from the manifest tree.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ManifestAttributes {
    pub package: Option<String>,
    pub version_code: Option<String>,
    pub version_name: Option<String>,
    pub label: Option<String>,
}

impl ManifestAttributes {
    /// Walk the chunk stream of a binary XML document.
    pub fn parse(data: &[u8]) -> Result<Self, DescriptorError> {
        let doc = ChunkHeader::read(data, 0)?;
        if doc.kind != RES_XML_TYPE {
            return Err(DescriptorError::malformed(
                0,
                format!("expected RES_XML_TYPE, found chunk type {:#06x}", doc.kind),
            ));
        }
        let end = doc.size;

        let mut pool: Option<StringPool<'_>> = None;
        let mut resource_ids: &[u8] = &[];
        let mut attrs = Self::default();
        let mut seen_manifest = false;

        let mut pos = doc.header_size;
        while pos + CHUNK_HEADER_SIZE <= end {
            let chunk = ChunkHeader::read(&data[..end], pos)?;
            let body = &data[pos..pos + chunk.size];

            match chunk.kind {
                RES_STRING_POOL_TYPE => pool = Some(StringPool::parse(body, pos)?),
                RES_XML_RESOURCE_MAP_TYPE => resource_ids = &body[chunk.header_size..],
                RES_XML_START_ELEMENT_TYPE => {
                    let pool = pool.as_ref().ok_or_else(|| {
                        DescriptorError::malformed(pos, "element before string pool")
                    })?;
                    let element = Element::parse(body, &chunk, pos)?;
                    let name = pool.get(element.name)?;

                    match name.as_str() {
                        "manifest" if !seen_manifest => {
                            seen_manifest = true;
                            attrs.read_manifest(&element, pool, resource_ids)?;
                        }
                        "application" if seen_manifest => {
                            attrs.label = element
                                .find(pool, resource_ids, "label", ATTR_LABEL)?
                                .and_then(|a| a.literal_string(pool).transpose())
                                .transpose()?;
                            break;
                        }
                        _ => {}
                    }
                }
                _ => {}
            }

            pos += chunk.size;
        }

        if !seen_manifest {
            return Err(DescriptorError::NoManifestElement);
        }
        Ok(attrs)
    }

    fn read_manifest(
        &mut self,
        element: &Element<'_>,
        pool: &StringPool<'_>,
        resource_ids: &[u8],
    ) -> Result<(), DescriptorError> {
        for attr in element.attributes() {
            let attr = attr?;
            let name = pool.get(attr.name)?;
            let res_id = resource_id(resource_ids, attr.name);

            let slot = match (name.as_str(), res_id) {
                ("package", _) => &mut self.package,
                ("versionCode", _) | (_, Some(ATTR_VERSION_CODE)) => &mut self.version_code,
                ("versionName", _) | (_, Some(ATTR_VERSION_NAME)) => &mut self.version_name,
                _ => continue,
            };
            *slot = Some(attr.render(pool)?);
        }
        Ok(())
    }
}

fn resource_id(map: &[u8], index: u32) -> Option<u32> {
    let off = index as usize * 4;
    map.get(off..off + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn u16_at(data: &[u8], off: usize) -> Result<u16, DescriptorError> {
    data.get(off..off + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| DescriptorError::malformed(off, "unexpected end of data"))
}

fn u32_at(data: &[u8], off: usize) -> Result<u32, DescriptorError> {
    data.get(off..off + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| DescriptorError::malformed(off, "unexpected end of data"))
}

#[derive(Debug)]
struct ChunkHeader {
    kind: u16,
    header_size: usize,
    size: usize,
}

impl ChunkHeader {
    /// Read and bounds-check the chunk starting at `pos`.
    fn read(data: &[u8], pos: usize) -> Result<Self, DescriptorError> {
        let kind = u16_at(data, pos)?;
        let header_size = u16_at(data, pos + 2)? as usize;
        let size = u32_at(data, pos + 4)? as usize;

        if header_size < CHUNK_HEADER_SIZE || size < header_size {
            return Err(DescriptorError::malformed(
                pos,
                format!("bad chunk sizes (header {header_size}, total {size})"),
            ));
        }
        if pos.checked_add(size).is_none_or(|chunk_end| chunk_end > data.len()) {
            return Err(DescriptorError::malformed(
                pos,
                format!("chunk of {size} bytes runs past end of data"),
            ));
        }

        Ok(Self {
            kind,
            header_size,
            size,
        })
    }
}

/// Lazily decoded string pool; strings are materialized on lookup.
#[derive(Debug)]
struct StringPool<'a> {
    chunk: &'a [u8],
    base: usize,
    offsets: Vec<u32>,
    strings_start: usize,
    utf8: bool,
}

impl<'a> StringPool<'a> {
    fn parse(chunk: &'a [u8], base: usize) -> Result<Self, DescriptorError> {
        let header_size = u16_at(chunk, 2)? as usize;
        if header_size < STRING_POOL_HEADER_SIZE {
            return Err(DescriptorError::malformed(base, "string pool header too small"));
        }
        let count = u32_at(chunk, 8)? as usize;
        let flags = u32_at(chunk, 16)?;
        let strings_start = u32_at(chunk, 20)? as usize;

        let index_end = count
            .checked_mul(4)
            .and_then(|n| n.checked_add(header_size))
            .filter(|&n| n <= chunk.len())
            .ok_or_else(|| DescriptorError::malformed(base, "string index out of bounds"))?;
        if strings_start > chunk.len() {
            return Err(DescriptorError::malformed(base, "string data out of bounds"));
        }

        let offsets = chunk[header_size..index_end]
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self {
            chunk,
            base,
            offsets,
            strings_start,
            utf8: flags & UTF8_FLAG != 0,
        })
    }

    fn get(&self, index: u32) -> Result<String, DescriptorError> {
        let offset = *self.offsets.get(index as usize).ok_or_else(|| {
            DescriptorError::malformed(self.base, format!("string index {index} out of range"))
        })?;
        let start = self.strings_start + offset as usize;

        if self.utf8 {
            self.utf8_at(start)
        } else {
            self.utf16_at(start)
        }
    }

    fn utf8_at(&self, start: usize) -> Result<String, DescriptorError> {
        let (_, n) = self.len8(start)?;
        let (byte_len, m) = self.len8(start + n)?;
        let from = start + n + m;
        let bytes = self
            .chunk
            .get(from..from + byte_len)
            .ok_or_else(|| DescriptorError::malformed(self.base + from, "string runs past pool"))?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn utf16_at(&self, start: usize) -> Result<String, DescriptorError> {
        let first = u16_at(self.chunk, start).map_err(|_| self.truncated(start))?;
        let (len, skip) = if first & 0x8000 == 0 {
            (first as usize, 2)
        } else {
            let second = u16_at(self.chunk, start + 2).map_err(|_| self.truncated(start))?;
            ((((first & 0x7FFF) as usize) << 16) | second as usize, 4)
        };

        let from = start + skip;
        let bytes = len
            .checked_mul(2)
            .and_then(|n| self.chunk.get(from..from + n))
            .ok_or_else(|| self.truncated(from))?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }

    /// UTF-8 pool lengths: one byte, or two with the high bit set.
    fn len8(&self, at: usize) -> Result<(usize, usize), DescriptorError> {
        let first = *self.chunk.get(at).ok_or_else(|| self.truncated(at))?;
        if first & 0x80 == 0 {
            return Ok((first as usize, 1));
        }
        let second = *self.chunk.get(at + 1).ok_or_else(|| self.truncated(at))?;
        Ok(((((first & 0x7F) as usize) << 8) | second as usize, 2))
    }

    fn truncated(&self, at: usize) -> DescriptorError {
        DescriptorError::malformed(self.base + at, "string runs past pool")
    }
}

/// A `RES_XML_START_ELEMENT_TYPE` chunk.
#[derive(Debug)]
struct Element<'a> {
    chunk: &'a [u8],
    base: usize,
    name: u32,
    attr_start: usize,
    attr_size: usize,
    attr_count: usize,
}

impl<'a> Element<'a> {
    fn parse(chunk: &'a [u8], header: &ChunkHeader, base: usize) -> Result<Self, DescriptorError> {
        // ResXMLTree_attrExt follows the node header.
        let ext = header.header_size;
        let name = u32_at(chunk, ext + 4)
            .map_err(|_| DescriptorError::malformed(base, "element chunk too small"))?;
        let attr_start = ext + u16_at(chunk, ext + 8)? as usize;
        let attr_size = u16_at(chunk, ext + 10)? as usize;
        let attr_count = u16_at(chunk, ext + 12)? as usize;

        if attr_count > 0 && attr_size < ATTRIBUTE_MIN_SIZE {
            return Err(DescriptorError::malformed(
                base,
                format!("attribute size {attr_size} too small"),
            ));
        }
        if attr_start + attr_size * attr_count > chunk.len() {
            return Err(DescriptorError::malformed(
                base,
                "attributes run past element chunk",
            ));
        }

        Ok(Self {
            chunk,
            base,
            name,
            attr_start,
            attr_size,
            attr_count,
        })
    }

    fn attributes(&self) -> impl Iterator<Item = Result<Attribute, DescriptorError>> + '_ {
        (0..self.attr_count).map(move |i| {
            let off = self.attr_start + i * self.attr_size;
            Attribute::read(self.chunk, off)
                .map_err(|_| DescriptorError::malformed(self.base + off, "truncated attribute"))
        })
    }

    /// First attribute called `name`, or carrying framework id `res_id`.
    fn find(
        &self,
        pool: &StringPool<'_>,
        resource_ids: &[u8],
        name: &str,
        res_id: u32,
    ) -> Result<Option<Attribute>, DescriptorError> {
        for attr in self.attributes() {
            let attr = attr?;
            if resource_id(resource_ids, attr.name) == Some(res_id)
                || pool.get(attr.name)? == name
            {
                return Ok(Some(attr));
            }
        }
        Ok(None)
    }
}

/// One `ResXMLTree_attribute` with its typed `Res_value`.
#[derive(Debug, Clone, Copy)]
struct Attribute {
    name: u32,
    raw_value: u32,
    data_type: u8,
    data: u32,
}

impl Attribute {
    fn read(chunk: &[u8], off: usize) -> Result<Self, DescriptorError> {
        Ok(Self {
            name: u32_at(chunk, off + 4)?,
            raw_value: u32_at(chunk, off + 8)?,
            data_type: *chunk
                .get(off + 15)
                .ok_or_else(|| DescriptorError::malformed(off, "truncated value"))?,
            data: u32_at(chunk, off + 16)?,
        })
    }

    /// The value as a string literal, if it is one.
    fn literal_string(&self, pool: &StringPool<'_>) -> Result<Option<String>, DescriptorError> {
        if self.data_type == TYPE_STRING {
            return pool.get(self.data).map(Some);
        }
        if self.raw_value != NO_INDEX {
            return pool.get(self.raw_value).map(Some);
        }
        Ok(None)
    }

    /// Render the value the way `aapt dump xmltree` would.
    fn render(&self, pool: &StringPool<'_>) -> Result<String, DescriptorError> {
        if let Some(s) = self.literal_string(pool)? {
            return Ok(s);
        }
        let data = self.data;
        Ok(match self.data_type {
            TYPE_INT_DEC => i32::from_le_bytes(data.to_le_bytes()).to_string(),
            TYPE_INT_HEX => format!("0x{data:08x}"),
            TYPE_INT_BOOLEAN => (data != 0).to_string(),
            TYPE_REFERENCE => format!("@0x{data:08x}"),
            TYPE_FLOAT => f32::from_bits(data).to_string(),
            _ => format!("{data}"),
        })
    }
}
