//! The reversible textual form of schemas.
//!
//! A schema serializes to a JSON object holding its version, the optional
//! stream-compression and custom-header settings, and an array of block
//! descriptors. Kind names are short PascalCase strings (`"Numeric"`,
//! `"Bytes"`, `"String"`, `"IFrameOnly"`, `"NumericDelta"`); type parameters
//! travel in the `custom` arrays as canonical primitive names (`"u8"` ...
//! `"f64"`) or [`StrEncoding`] names. User-defined kinds round-trip through a
//! [`JsonHook`].
//!
//! [`StrEncoding`]: crate::StrEncoding

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::block::{Block, BlockKind, CustomBlock};
use crate::delta::{Compression, CustomCompression};
use crate::error::{Error, Result};
use crate::schema::{CustomHeader, MultiSchema, Schema, StreamCompression};
use crate::text::StrEncoding;
use crate::value::Primitive;

/// Extension hook for persisting user-defined block and compression kinds.
///
/// On serialize, `block_custom`/`compression_custom` produce the `custom`
/// payload strings for a user-defined kind; returning `None` makes
/// serialization fail with [`Error::UnknownKind`]. On deserialize,
/// `block_from`/`compression_from` are consulted only after every built-in
/// kind has failed to match.
pub trait JsonHook {
    fn block_custom(&self, block: &CustomBlock) -> Option<Vec<String>> {
        let _ = block;
        None
    }

    fn compression_custom(&self, compression: &CustomCompression) -> Option<Vec<String>> {
        let _ = compression;
        None
    }

    fn block_from(&self, kind: &str, custom: &[String]) -> Option<BlockKind> {
        let _ = (kind, custom);
        None
    }

    fn compression_from(&self, kind: &str, custom: &[String]) -> Option<Compression> {
        let _ = (kind, custom);
        None
    }
}

/// The hook used when the caller doesn't supply one: built-in kinds only.
struct NoHook;

impl JsonHook for NoHook {}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaRepr {
    version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    i_frame_interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_header: Option<ByteBuf>,
    blocks: Vec<BlockRepr>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockRepr {
    #[serde(rename = "type")]
    kind: String,
    index: u32,
    property_name: String,
    #[serde(default)]
    custom: Vec<String>,
    #[serde(default)]
    compression: String,
    #[serde(default)]
    compression_custom: Vec<String>,
}

impl Schema {
    /// Serialize to the textual form. Fails on user-defined kinds; use
    /// [`Schema::to_json_with`] to supply a hook for those.
    pub fn to_json(&self) -> Result<String> {
        self.to_json_with(&NoHook)
    }

    pub fn to_json_with(&self, hook: &dyn JsonHook) -> Result<String> {
        Ok(serde_json::to_string(&schema_repr(self, hook)?)?)
    }

    /// Like [`Schema::to_json`], with human-readable indentation.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&schema_repr(self, &NoHook)?)?)
    }

    /// Rebuild a schema from its textual form, built-in kinds only.
    pub fn from_json(json: &str) -> Result<Schema> {
        Self::from_json_with(json, &NoHook)
    }

    pub fn from_json_with(json: &str, hook: &dyn JsonHook) -> Result<Schema> {
        let repr: SchemaRepr = serde_json::from_str(json)?;
        schema_from_repr(repr, hook)
    }
}

impl MultiSchema {
    /// Serialize every version to one JSON array.
    pub fn to_json(&self) -> Result<String> {
        self.to_json_with(&NoHook)
    }

    pub fn to_json_with(&self, hook: &dyn JsonHook) -> Result<String> {
        let reprs = self
            .schemas()
            .iter()
            .map(|s| schema_repr(s, hook))
            .collect::<Result<Vec<_>>>()?;
        Ok(serde_json::to_string(&reprs)?)
    }

    pub fn from_json(json: &str) -> Result<MultiSchema> {
        Self::from_json_with(json, &NoHook)
    }

    pub fn from_json_with(json: &str, hook: &dyn JsonHook) -> Result<MultiSchema> {
        let reprs: Vec<SchemaRepr> = serde_json::from_str(json)?;
        let schemas = reprs
            .into_iter()
            .map(|r| schema_from_repr(r, hook))
            .collect::<Result<Vec<_>>>()?;
        Ok(MultiSchema::new(schemas))
    }
}

fn schema_repr(schema: &Schema, hook: &dyn JsonHook) -> Result<SchemaRepr> {
    let blocks = schema
        .blocks()
        .iter()
        .map(|b| block_repr(b, hook))
        .collect::<Result<Vec<_>>>()?;
    Ok(SchemaRepr {
        version: schema.version(),
        i_frame_interval: schema.stream_compression().map(|s| s.i_frame_interval()),
        custom_header: schema
            .custom_header()
            .map(|h| ByteBuf::from(h.info().to_vec())),
        blocks,
    })
}

fn block_repr(block: &Block, hook: &dyn JsonHook) -> Result<BlockRepr> {
    let (kind, custom) = match block.kind() {
        BlockKind::Numeric(prim) => ("Numeric".to_string(), vec![prim.name().to_string()]),
        BlockKind::Bytes => ("Bytes".to_string(), Vec::new()),
        BlockKind::String(enc) => ("String".to_string(), vec![enc.name().to_string()]),
        BlockKind::Custom(custom_block) => {
            let payload = hook
                .block_custom(custom_block)
                .ok_or_else(|| Error::UnknownKind(custom_block.name().to_string()))?;
            (custom_block.name().to_string(), payload)
        }
    };
    let (compression, compression_custom) = match block.compression() {
        None => (String::new(), Vec::new()),
        Some(Compression::IFrameOnly) => ("IFrameOnly".to_string(), Vec::new()),
        Some(Compression::NumericDelta { original, delta }) => (
            "NumericDelta".to_string(),
            vec![original.name().to_string(), delta.name().to_string()],
        ),
        Some(Compression::Custom(custom_compression)) => {
            let payload = hook
                .compression_custom(custom_compression)
                .ok_or_else(|| Error::UnknownKind(custom_compression.name().to_string()))?;
            (custom_compression.name().to_string(), payload)
        }
    };
    Ok(BlockRepr {
        kind,
        index: block.index(),
        property_name: block.property_name().to_string(),
        custom,
        compression,
        compression_custom,
    })
}

fn schema_from_repr(repr: SchemaRepr, hook: &dyn JsonHook) -> Result<Schema> {
    let blocks = repr
        .blocks
        .into_iter()
        .map(|b| block_from_repr(b, hook))
        .collect::<Result<Vec<_>>>()?;
    let mut schema = Schema::new(repr.version, blocks)?;
    if let Some(interval) = repr.i_frame_interval {
        schema = schema.with_stream_compression(StreamCompression::new(interval)?);
    }
    if let Some(info) = repr.custom_header {
        schema = schema.with_custom_header(CustomHeader::new(info.into_vec()));
    }
    Ok(schema)
}

fn block_from_repr(repr: BlockRepr, hook: &dyn JsonHook) -> Result<Block> {
    let kind = match repr.kind.as_str() {
        "Numeric" => BlockKind::Numeric(primitive_arg(&repr.kind, &repr.custom)?),
        "Bytes" => BlockKind::Bytes,
        "String" => {
            let name = single_arg(&repr.kind, &repr.custom)?;
            BlockKind::String(
                StrEncoding::from_name(name)
                    .ok_or_else(|| Error::UnsupportedType(name.to_string()))?,
            )
        }
        _ => hook
            .block_from(&repr.kind, &repr.custom)
            .ok_or_else(|| Error::UnknownKind(repr.kind.clone()))?,
    };
    let compression = match repr.compression.as_str() {
        "" => None,
        "IFrameOnly" => Some(Compression::IFrameOnly),
        "NumericDelta" => {
            if repr.compression_custom.len() != 2 {
                return Err(Error::InvalidSchema(format!(
                    "NumericDelta expects 2 type names, got {}",
                    repr.compression_custom.len()
                )));
            }
            let original = primitive_named(&repr.compression_custom[0])?;
            let delta = primitive_named(&repr.compression_custom[1])?;
            Some(Compression::NumericDelta { original, delta })
        }
        name => Some(
            hook.compression_from(name, &repr.compression_custom)
                .ok_or_else(|| Error::UnknownKind(name.to_string()))?,
        ),
    };
    let mut block = Block::new(repr.index, repr.property_name, kind);
    if let Some(compression) = compression {
        block = block.with_compression(compression);
    }
    Ok(block)
}

fn single_arg<'a>(kind: &str, custom: &'a [String]) -> Result<&'a str> {
    if custom.len() != 1 {
        return Err(Error::InvalidSchema(format!(
            "{} expects 1 custom item, got {}",
            kind,
            custom.len()
        )));
    }
    Ok(&custom[0])
}

fn primitive_arg(kind: &str, custom: &[String]) -> Result<Primitive> {
    primitive_named(single_arg(kind, custom)?)
}

fn primitive_named(name: &str) -> Result<Primitive> {
    Primitive::from_name(name).ok_or_else(|| Error::UnsupportedType(name.to_string()))
}
