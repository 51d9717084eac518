//! Block descriptors: the schema's per-field codecs.

use std::fmt;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::delta::Compression;
use crate::error::{Error, Result};
use crate::text::StrEncoding;
use crate::value::{Primitive, Value};

/// Encode half of a user-defined block kind.
pub type CustomEncodeFn = Arc<dyn Fn(&Value) -> Result<Vec<u8>> + Send + Sync>;
/// Decode half of a user-defined block kind.
pub type CustomDecodeFn = Arc<dyn Fn(&[u8]) -> Result<Value> + Send + Sync>;

/// A user-defined block kind: a kind name, an advertised byte length, and an
/// encode/decode function pair.
///
/// `byte_length` of `None` opts in to the variable-length framing: the entry
/// encoder appends the one-byte terminator and the decoder hands `decode` the
/// accumulated payload. A `Some(n)` length is enforced against the bytes
/// `encode` returns.
#[derive(Clone)]
pub struct CustomBlock {
    name: String,
    byte_length: Option<usize>,
    encode: CustomEncodeFn,
    decode: CustomDecodeFn,
}

impl CustomBlock {
    pub fn new(
        name: impl Into<String>,
        byte_length: Option<usize>,
        encode: CustomEncodeFn,
        decode: CustomDecodeFn,
    ) -> Self {
        Self {
            name: name.into(),
            byte_length,
            encode,
            decode,
        }
    }

    /// The kind name stored in the schema's textual form.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed byte length, or `None` for variable-length framing.
    pub fn byte_length(&self) -> Option<usize> {
        self.byte_length
    }
}

impl fmt::Debug for CustomBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CustomBlock")
            .field("name", &self.name)
            .field("byte_length", &self.byte_length)
            .finish()
    }
}

/// What one field of an entry holds and how it is encoded.
#[derive(Clone, Debug)]
pub enum BlockKind {
    /// A fixed-width numeric primitive, little-endian on the wire.
    Numeric(Primitive),
    /// A raw byte sequence, written verbatim under variable-length framing.
    Bytes,
    /// Unicode text in the given encoding, under variable-length framing.
    String(StrEncoding),
    /// A user-defined kind.
    Custom(CustomBlock),
}

impl BlockKind {
    /// Fixed byte length of this kind, or `None` for variable-length kinds.
    pub fn byte_length(&self) -> Option<usize> {
        match self {
            BlockKind::Numeric(prim) => Some(prim.size()),
            BlockKind::Bytes | BlockKind::String(_) => None,
            BlockKind::Custom(custom) => custom.byte_length(),
        }
    }

    /// Whether `value`'s dynamic type matches this kind.
    pub(crate) fn accepts(&self, value: &Value) -> bool {
        match self {
            BlockKind::Numeric(prim) => value.primitive() == Some(*prim),
            BlockKind::Bytes => value.is_bin(),
            BlockKind::String(_) => value.is_str(),
            // A custom codec's encode fn is the only authority on its types
            BlockKind::Custom(_) => true,
        }
    }
}

/// The schema descriptor for one field of an entry.
///
/// Blocks are laid out within an entry in ascending `index` order. When a
/// block carries a compression, P-frame entries encode the field through the
/// compression codec instead of the block codec.
#[derive(Clone, Debug)]
pub struct Block {
    index: u32,
    property_name: String,
    kind: BlockKind,
    compression: Option<Compression>,
}

impl Block {
    pub fn new(index: u32, property_name: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            index,
            property_name: property_name.into(),
            kind,
            compression: None,
        }
    }

    /// Attach a compression codec, making this field delta-coded in P-frames.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn property_name(&self) -> &str {
        &self.property_name
    }

    pub fn kind(&self) -> &BlockKind {
        &self.kind
    }

    pub fn compression(&self) -> Option<&Compression> {
        self.compression.as_ref()
    }

    /// Fixed byte length of this block, or `None` for variable-length blocks.
    pub fn byte_length(&self) -> Option<usize> {
        self.kind.byte_length()
    }

    /// Encode `value` through the block codec. Framing (the terminator for
    /// variable-length blocks) is the entry encoder's job, not this one's.
    pub(crate) fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let bytes = match (&self.kind, value) {
            (BlockKind::Numeric(prim), _) if value.primitive() == Some(*prim) => {
                let mut buf = Vec::with_capacity(8);
                write_numeric(&mut buf, value)?;
                buf
            }
            (BlockKind::Bytes, Value::Binary(v)) => v.clone(),
            (BlockKind::String(enc), Value::String(s)) => enc.encode(s)?,
            (BlockKind::Custom(custom), _) => (custom.encode)(value)?,
            _ => {
                return Err(Error::BadEncode(format!(
                    "block \"{}\" expected {:?}, got {}",
                    self.property_name,
                    self.kind,
                    value.type_name()
                )))
            }
        };
        if let Some(expected) = self.byte_length() {
            if bytes.len() != expected {
                return Err(Error::LengthMismatch {
                    expected,
                    actual: bytes.len(),
                });
            }
        }
        Ok(bytes)
    }

    /// Decode one field payload back into a value. `payload` is exactly the
    /// block's fixed length, or the terminator-stripped bytes of a
    /// variable-length field.
    pub(crate) fn decode(&self, payload: &[u8]) -> Result<Value> {
        match &self.kind {
            BlockKind::Numeric(prim) => {
                let mut buf = payload;
                read_numeric(&mut buf, *prim)
            }
            BlockKind::Bytes => Ok(Value::Binary(payload.to_vec())),
            BlockKind::String(enc) => Ok(Value::String(enc.decode(payload)?)),
            BlockKind::Custom(custom) => (custom.decode)(payload),
        }
    }
}

/// Write a numeric value in its little-endian wire form.
pub(crate) fn write_numeric(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    match *value {
        Value::U8(v) => buf.write_u8(v)?,
        Value::I8(v) => buf.write_i8(v)?,
        Value::Bool(v) => buf.write_u8(v as u8)?,
        Value::Char16(v) => buf.write_u16::<LittleEndian>(v)?,
        Value::I16(v) => buf.write_i16::<LittleEndian>(v)?,
        Value::U16(v) => buf.write_u16::<LittleEndian>(v)?,
        Value::I32(v) => buf.write_i32::<LittleEndian>(v)?,
        Value::U32(v) => buf.write_u32::<LittleEndian>(v)?,
        Value::I64(v) => buf.write_i64::<LittleEndian>(v)?,
        Value::U64(v) => buf.write_u64::<LittleEndian>(v)?,
        Value::F32(v) => buf.write_f32::<LittleEndian>(v)?,
        Value::F64(v) => buf.write_f64::<LittleEndian>(v)?,
        Value::Binary(_) | Value::String(_) => {
            return Err(Error::UnsupportedType(value.type_name().into()))
        }
    }
    Ok(())
}

/// Read a numeric value of type `prim` from its little-endian wire form.
pub(crate) fn read_numeric(buf: &mut &[u8], prim: Primitive) -> Result<Value> {
    Ok(match prim {
        Primitive::U8 => Value::U8(buf.read_u8()?),
        Primitive::I8 => Value::I8(buf.read_i8()?),
        Primitive::Bool => Value::Bool(buf.read_u8()? != 0),
        Primitive::Char16 => Value::Char16(buf.read_u16::<LittleEndian>()?),
        Primitive::I16 => Value::I16(buf.read_i16::<LittleEndian>()?),
        Primitive::U16 => Value::U16(buf.read_u16::<LittleEndian>()?),
        Primitive::I32 => Value::I32(buf.read_i32::<LittleEndian>()?),
        Primitive::U32 => Value::U32(buf.read_u32::<LittleEndian>()?),
        Primitive::I64 => Value::I64(buf.read_i64::<LittleEndian>()?),
        Primitive::U64 => Value::U64(buf.read_u64::<LittleEndian>()?),
        Primitive::F32 => Value::F32(buf.read_f32::<LittleEndian>()?),
        Primitive::F64 => Value::F64(buf.read_f64::<LittleEndian>()?),
    })
}
