//! framepack is a compact, self-describing binary codec for streams of
//! small, homogeneous records.
//!
//! A [`Schema`] describes how each record ("entry") decomposes into typed
//! byte segments: fixed-width numeric blocks, variable-length byte and
//! string blocks, and user-defined block kinds. Schemas optionally declare
//! temporal compression in the style of video keying: every
//! `i_frame_interval`-th entry is a full I-frame, and the entries between
//! are P-frames whose delta-coded fields store either nothing (carried
//! forward) or a numeric difference against the previous entry.
//!
//! Schemas persist to a reversible JSON form (see [`JsonHook`] for
//! user-defined kinds), and a [`MultiSchema`] lets a decoder pick the right
//! schema from the stream's version byte.
//!
//! ```
//! use framepack::{
//!     Block, BlockKind, Compression, Decoder, Encoder, Entry, Primitive, Schema, SliceSource,
//!     StrEncoding, StreamCompression, Value,
//! };
//!
//! let schema = Schema::new(
//!     1,
//!     vec![
//!         Block::new(0, "x", BlockKind::Numeric(Primitive::U16)).with_compression(
//!             Compression::NumericDelta {
//!                 original: Primitive::U16,
//!                 delta: Primitive::I8,
//!             },
//!         ),
//!         Block::new(1, "label", BlockKind::String(StrEncoding::Utf8)),
//!     ],
//! )?
//! .with_stream_compression(StreamCompression::new(4)?);
//!
//! let mut encoder = Encoder::new(&schema, Vec::new())?;
//! encoder.write_entry(&Entry::new(vec![Value::U16(100), Value::from("start")]))?;
//! encoder.write_entry(&Entry::new(vec![Value::U16(103), Value::from("run")]))?;
//! let bytes = encoder.finish();
//!
//! let decoder = Decoder::new(&schema, SliceSource::new(&bytes))?;
//! let entries = decoder.collect::<framepack::Result<Vec<Entry>>>()?;
//! assert_eq!(entries[1][0], Value::U16(103));
//! # Ok::<(), framepack::Error>(())
//! ```

mod block;
mod decode;
mod delta;
mod encode;
mod entry;
mod error;
mod json;
mod record;
mod schema;
mod text;
mod value;

pub use block::{Block, BlockKind, CustomBlock, CustomDecodeFn, CustomEncodeFn};
pub use decode::{ByteSource, Decoder, IoSource, Records, SliceSource};
pub use delta::{Compression, CustomCompressFn, CustomCompression, CustomDecompressFn};
pub use encode::{ByteSink, Encoder, IoSink};
pub use entry::Entry;
pub use error::{Error, Result};
pub use json::JsonHook;
pub use record::{FieldSpec, Record, RecordSchema};
pub use schema::{CustomHeader, MultiSchema, Schema, SchemaSet, StreamCompression};
pub use text::StrEncoding;
pub use value::{Primitive, Value};
