//! The entry stream encoder and its byte sinks.

use std::io::Write;

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::Schema;

/// Destination for encoded bytes.
pub trait ByteSink {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()>;
}

/// In-memory byte collection.
impl ByteSink for Vec<u8> {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }
}

/// A sink over any [`io::Write`] stream, tracking the write position and
/// flushing when dropped.
pub struct IoSink<W: Write> {
    writer: W,
    position: u64,
}

impl<W: Write> IoSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            position: 0,
        }
    }

    /// Bytes written through this sink so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

impl<W: Write> ByteSink for IoSink<W> {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.writer.write_all(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }
}

impl<W: Write> Drop for IoSink<W> {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Writes a stream of entries against a borrowed schema.
///
/// The header (`[version][custom_info?]`) goes out at construction, so an
/// encoder that never sees an entry still produces a valid, empty stream.
/// Entries are then written strictly in order; the first is always an
/// I-frame, and when the schema declares stream compression every
/// `i_frame_interval`-th entry after it starts a new I-frame.
///
/// Variable-length fields are framed with a single `0x00` terminator byte.
/// Payloads are not escaped: a variable-length value containing a `0x00`
/// byte will not round-trip. This is a limitation of the format itself.
pub struct Encoder<'a, S: ByteSink> {
    schema: &'a Schema,
    sink: S,
    count: u32,
    prev: Option<Entry>,
}

impl<'a, S: ByteSink> Encoder<'a, S> {
    /// Start a stream, writing the version byte and the schema's default
    /// custom header bytes, if it declares any.
    pub fn new(schema: &'a Schema, sink: S) -> Result<Self> {
        Self::start(schema, sink, None)
    }

    /// Start a stream with caller-supplied custom header bytes in place of
    /// the schema's default. The length must match the declared length.
    pub fn with_custom_info(schema: &'a Schema, sink: S, info: &[u8]) -> Result<Self> {
        Self::start(schema, sink, Some(info))
    }

    fn start(schema: &'a Schema, mut sink: S, info: Option<&[u8]>) -> Result<Self> {
        sink.write_bytes(&[schema.version()])?;
        match (schema.custom_header(), info) {
            (Some(header), None) => sink.write_bytes(header.info())?,
            (Some(header), Some(info)) => {
                if info.len() != header.byte_length() {
                    return Err(Error::CustomInfoLengthMismatch {
                        expected: header.byte_length(),
                        actual: info.len(),
                    });
                }
                sink.write_bytes(info)?;
            }
            (None, Some(info)) if !info.is_empty() => {
                return Err(Error::CustomInfoLengthMismatch {
                    expected: 0,
                    actual: info.len(),
                });
            }
            _ => (),
        }
        Ok(Self {
            schema,
            sink,
            count: 0,
            prev: None,
        })
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    /// Encode one entry. The entry's length must equal the schema's block
    /// count, and each value's type must match its block.
    pub fn write_entry(&mut self, entry: &Entry) -> Result<()> {
        let blocks = self.schema.blocks();
        if entry.len() != blocks.len() {
            return Err(Error::BadEncode(format!(
                "entry has {} values, schema has {} blocks",
                entry.len(),
                blocks.len()
            )));
        }
        let interval = self
            .schema
            .stream_compression()
            .map(|s| s.i_frame_interval());
        let i_frame = interval.is_none() || self.count == 0;
        for (i, block) in blocks.iter().enumerate() {
            let value = &entry[i];
            match block.compression() {
                Some(compression) if !i_frame => {
                    let prev = self.prev.as_ref().ok_or_else(|| {
                        Error::BadEncode("P-frame without a preceding entry".into())
                    })?;
                    let bytes = compression.compress(&prev[i], value)?;
                    self.sink.write_bytes(&bytes)?;
                }
                _ => {
                    let bytes = block.encode(value)?;
                    self.sink.write_bytes(&bytes)?;
                    if block.byte_length().is_none() {
                        self.sink.write_bytes(&[0u8])?;
                    }
                }
            }
        }
        if let Some(k) = interval {
            self.count += 1;
            if self.count == k {
                self.count = 0;
            }
        }
        self.prev = Some(entry.clone());
        Ok(())
    }

    /// Cast a record through the schema and encode it as one entry.
    pub fn write_record<T: Record>(&mut self, record: &T) -> Result<()> {
        let entry = self.schema.cast_to_entry(record)?;
        self.write_entry(&entry)
    }

    /// End the stream, returning the sink. The format has no trailer, so
    /// this writes nothing.
    pub fn finish(self) -> S {
        self.sink
    }
}
