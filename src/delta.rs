//! Per-field delta codecs, active only in P-frame entries.

use std::fmt;
use std::sync::Arc;

use crate::block::{read_numeric, write_numeric};
use crate::error::{Error, Result};
use crate::value::{Primitive, Value};

/// Compress half of a user-defined compression kind: previous and current
/// field values in, P-frame bytes out.
pub type CustomCompressFn = Arc<dyn Fn(&Value, &Value) -> Result<Vec<u8>> + Send + Sync>;
/// Decompress half of a user-defined compression kind: previous value and
/// P-frame bytes in, reconstructed current value out.
pub type CustomDecompressFn = Arc<dyn Fn(&Value, &[u8]) -> Result<Value> + Send + Sync>;

/// A user-defined compression kind with a fixed advertised P-frame length.
#[derive(Clone)]
pub struct CustomCompression {
    name: String,
    p_frame_byte_length: usize,
    compress: CustomCompressFn,
    decompress: CustomDecompressFn,
}

impl CustomCompression {
    pub fn new(
        name: impl Into<String>,
        p_frame_byte_length: usize,
        compress: CustomCompressFn,
        decompress: CustomDecompressFn,
    ) -> Self {
        Self {
            name: name.into(),
            p_frame_byte_length,
            compress,
            decompress,
        }
    }

    /// The kind name stored in the schema's textual form.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn p_frame_byte_length(&self) -> usize {
        self.p_frame_byte_length
    }
}

impl fmt::Debug for CustomCompression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CustomCompression")
            .field("name", &self.name)
            .field("p_frame_byte_length", &self.p_frame_byte_length)
            .finish()
    }
}

/// How a block's field is stored in P-frame entries.
///
/// Delta arithmetic wraps at every integer width, so a difference that
/// overflows the original primitive reconstructs deterministically on any
/// host. Float deltas use plain IEEE subtraction and addition.
#[derive(Clone, Debug)]
pub enum Compression {
    /// The field is written only in I-frames; P-frames contribute zero bytes
    /// and carry the previous value forward verbatim.
    IFrameOnly,
    /// P-frames store `current - previous`, computed in the `original`
    /// primitive's wrapping arithmetic and cast to the `delta` primitive.
    NumericDelta {
        original: Primitive,
        delta: Primitive,
    },
    /// A user-defined compression kind.
    Custom(CustomCompression),
}

impl Compression {
    /// Number of bytes this codec contributes to every P-frame entry.
    pub fn p_frame_byte_length(&self) -> usize {
        match self {
            Compression::IFrameOnly => 0,
            Compression::NumericDelta { delta, .. } => delta.size(),
            Compression::Custom(custom) => custom.p_frame_byte_length(),
        }
    }

    /// Check that a `NumericDelta`'s primitive pairing is coherent: bool is
    /// never delta-coded, and float originals take float deltas.
    pub(crate) fn validate(&self) -> Result<()> {
        if let Compression::NumericDelta { original, delta } = self {
            if *original == Primitive::Bool || *delta == Primitive::Bool {
                return Err(Error::UnsupportedType("bool".into()));
            }
            if original.is_float() != delta.is_float() {
                return Err(Error::UnsupportedType(format!(
                    "delta type {} doesn't suit original type {}",
                    delta.name(),
                    original.name()
                )));
            }
        }
        Ok(())
    }

    /// Produce the P-frame bytes for a field, given the previous entry's
    /// value and the current one.
    pub(crate) fn compress(&self, prev: &Value, curr: &Value) -> Result<Vec<u8>> {
        let bytes = match self {
            Compression::IFrameOnly => Vec::new(),
            Compression::NumericDelta { original, delta } => {
                let d = numeric_delta(prev, curr, *original, *delta)?;
                let mut buf = Vec::with_capacity(delta.size());
                write_numeric(&mut buf, &d)?;
                buf
            }
            Compression::Custom(custom) => (custom.compress)(prev, curr)?,
        };
        let expected = self.p_frame_byte_length();
        if bytes.len() != expected {
            return Err(Error::LengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(bytes)
    }

    /// Reconstruct a field's current value from the previous entry's value
    /// and exactly `p_frame_byte_length()` P-frame bytes.
    pub(crate) fn decompress(&self, prev: &Value, bytes: &[u8]) -> Result<Value> {
        match self {
            Compression::IFrameOnly => Ok(prev.clone()),
            Compression::NumericDelta { original, delta } => {
                let mut buf = bytes;
                let d = read_numeric(&mut buf, *delta)?;
                apply_delta(prev, &d, *original)
            }
            Compression::Custom(custom) => (custom.decompress)(prev, bytes),
        }
    }
}

/// `curr - prev` in the original primitive's arithmetic, cast to the delta
/// primitive. Integer math runs widened through `i128` and truncates back
/// down, which is exactly two's-complement wrapping at each width.
fn numeric_delta(prev: &Value, curr: &Value, original: Primitive, delta: Primitive) -> Result<Value> {
    if prev.primitive() != Some(original) || curr.primitive() != Some(original) {
        return Err(Error::BadEncode(format!(
            "delta-coded field expected {}, got {} and {}",
            original.name(),
            prev.type_name(),
            curr.type_name()
        )));
    }
    match (prev, curr) {
        (Value::F32(p), Value::F32(c)) => float_delta((c - p) as f64, delta),
        (Value::F64(p), Value::F64(c)) => float_delta(c - p, delta),
        _ => {
            let wide = widen(curr)? - widen(prev)?;
            // Wrap into the original's width first, then cast to the delta
            // primitive
            let in_original = truncate(wide, original);
            Ok(truncate(widen(&in_original)?, delta))
        }
    }
}

/// `prev + delta` in the original primitive's wrapping arithmetic.
fn apply_delta(prev: &Value, d: &Value, original: Primitive) -> Result<Value> {
    if prev.primitive() != Some(original) {
        return Err(Error::BadDecode(format!(
            "delta-coded field expected {}, got {}",
            original.name(),
            prev.type_name()
        )));
    }
    match prev {
        Value::F32(p) => {
            let d = d
                .as_f64()
                .ok_or_else(|| Error::UnsupportedType(d.type_name().into()))?;
            Ok(Value::F32((*p as f64 + d) as f32))
        }
        Value::F64(p) => {
            let d = d
                .as_f64()
                .ok_or_else(|| Error::UnsupportedType(d.type_name().into()))?;
            Ok(Value::F64(p + d))
        }
        _ => {
            let wide = widen(prev)? + widen(d)?;
            Ok(truncate(wide, original))
        }
    }
}

fn float_delta(d: f64, delta: Primitive) -> Result<Value> {
    match delta {
        Primitive::F32 => Ok(Value::F32(d as f32)),
        Primitive::F64 => Ok(Value::F64(d)),
        _ => Err(Error::UnsupportedType(delta.name().into())),
    }
}

/// Widen an integer value to `i128`: sign-extend the signed primitives,
/// zero-extend the unsigned ones.
fn widen(value: &Value) -> Result<i128> {
    Ok(match *value {
        Value::U8(v) => v as i128,
        Value::I8(v) => v as i128,
        Value::Char16(v) | Value::U16(v) => v as i128,
        Value::I16(v) => v as i128,
        Value::U32(v) => v as i128,
        Value::I32(v) => v as i128,
        Value::U64(v) => v as i128,
        Value::I64(v) => v as i128,
        _ => return Err(Error::UnsupportedType(value.type_name().into())),
    })
}

/// Truncate an `i128` back down to `prim`, two's-complement wrapping.
fn truncate(x: i128, prim: Primitive) -> Value {
    match prim {
        Primitive::U8 => Value::U8(x as u8),
        Primitive::I8 => Value::I8(x as i8),
        Primitive::Char16 => Value::Char16(x as u16),
        Primitive::U16 => Value::U16(x as u16),
        Primitive::I16 => Value::I16(x as i16),
        Primitive::U32 => Value::U32(x as u32),
        Primitive::I32 => Value::I32(x as i32),
        Primitive::U64 => Value::U64(x as u64),
        Primitive::I64 => Value::I64(x as i64),
        // Bool and floats never reach the integer path
        Primitive::Bool => Value::Bool(x != 0),
        Primitive::F32 => Value::F32(x as f32),
        Primitive::F64 => Value::F64(x as f64),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn round_trip(comp: &Compression, prev: Value, curr: Value) -> Value {
        let bytes = comp.compress(&prev, &curr).unwrap();
        assert_eq!(bytes.len(), comp.p_frame_byte_length());
        comp.decompress(&prev, &bytes).unwrap()
    }

    #[test]
    fn i_frame_only_carries_forward() {
        let comp = Compression::IFrameOnly;
        assert_eq!(comp.p_frame_byte_length(), 0);
        let bytes = comp.compress(&Value::U8(3), &Value::U8(9)).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(comp.decompress(&Value::U8(3), &[]).unwrap(), Value::U8(3));
    }

    #[test]
    fn u8_delta_as_i8() {
        let comp = Compression::NumericDelta {
            original: Primitive::U8,
            delta: Primitive::I8,
        };
        // 105 - 100 = +5
        let bytes = comp.compress(&Value::U8(100), &Value::U8(105)).unwrap();
        assert_eq!(bytes, vec![0x05]);
        // 95 - 105 = -10 = 0xF6
        let bytes = comp.compress(&Value::U8(105), &Value::U8(95)).unwrap();
        assert_eq!(bytes, vec![0xF6]);
        assert_eq!(
            comp.decompress(&Value::U8(105), &bytes).unwrap(),
            Value::U8(95)
        );
    }

    #[test]
    fn unsigned_wrapping() {
        let comp = Compression::NumericDelta {
            original: Primitive::U8,
            delta: Primitive::U8,
        };
        // 2 - 250 wraps to 8 in u8 arithmetic
        let bytes = comp.compress(&Value::U8(250), &Value::U8(2)).unwrap();
        assert_eq!(bytes, vec![8]);
        assert_eq!(
            comp.decompress(&Value::U8(250), &bytes).unwrap(),
            Value::U8(2)
        );
    }

    #[test]
    fn signed_wrapping() {
        let comp = Compression::NumericDelta {
            original: Primitive::I16,
            delta: Primitive::I16,
        };
        assert_eq!(
            round_trip(&comp, Value::I16(i16::MAX), Value::I16(i16::MIN)),
            Value::I16(i16::MIN)
        );
        assert_eq!(
            round_trip(&comp, Value::I16(-10_000), Value::I16(10_000)),
            Value::I16(10_000)
        );
    }

    #[test]
    fn wide_original_narrow_delta() {
        let comp = Compression::NumericDelta {
            original: Primitive::I64,
            delta: Primitive::I8,
        };
        assert_eq!(comp.p_frame_byte_length(), 1);
        assert_eq!(
            round_trip(&comp, Value::I64(1_000_000), Value::I64(1_000_000 - 100)),
            Value::I64(999_900)
        );
    }

    #[test]
    fn float_delta() {
        let comp = Compression::NumericDelta {
            original: Primitive::F32,
            delta: Primitive::F32,
        };
        assert_eq!(
            round_trip(&comp, Value::F32(1.5), Value::F32(2.25)),
            Value::F32(2.25)
        );
    }

    #[test]
    fn validate_rejects_bool_and_mixed() {
        Compression::NumericDelta {
            original: Primitive::Bool,
            delta: Primitive::I8,
        }
        .validate()
        .unwrap_err();
        Compression::NumericDelta {
            original: Primitive::F32,
            delta: Primitive::I8,
        }
        .validate()
        .unwrap_err();
        Compression::NumericDelta {
            original: Primitive::U32,
            delta: Primitive::I16,
        }
        .validate()
        .unwrap();
    }

    #[test]
    fn custom_length_enforced() {
        let comp = Compression::Custom(CustomCompression::new(
            "Xor",
            1,
            Arc::new(|_: &Value, _: &Value| Ok(vec![0, 1])),
            Arc::new(|prev: &Value, _: &[u8]| Ok(prev.clone())),
        ));
        match comp.compress(&Value::U8(0), &Value::U8(1)) {
            Err(Error::LengthMismatch {
                expected: 1,
                actual: 2,
            }) => (),
            other => panic!("expected length mismatch, got {:?}", other),
        }
    }
}
