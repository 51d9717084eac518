//! The entry stream decoder and its byte sources.

use std::io;
use std::io::Read;
use std::marker::PhantomData;

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{Schema, SchemaSet};

/// Origin of encoded bytes.
///
/// `read_bytes` returns up to `n` bytes; anything shorter signals that the
/// source is exhausted. `can_read` is a cheap liveness hint and may be
/// optimistic for sources that only discover EOF by reading.
pub trait ByteSource {
    fn can_read(&self) -> bool;
    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>>;
}

/// In-memory byte sequence with an optional start offset.
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_offset(data, 0)
    }

    /// Start reading at `offset` instead of the beginning.
    pub fn with_offset(data: &'a [u8], offset: usize) -> Self {
        Self {
            data,
            pos: offset.min(data.len()),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}

impl ByteSource for SliceSource<'_> {
    fn can_read(&self) -> bool {
        self.pos < self.data.len()
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let end = self.pos.saturating_add(n).min(self.data.len());
        let out = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(out)
    }
}

/// A source over any [`io::Read`] stream, tracking the read position.
pub struct IoSource<R: Read> {
    reader: R,
    position: u64,
    eof: bool,
}

impl<R: Read> IoSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: 0,
            eof: false,
        }
    }

    /// Bytes read through this source so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }
}

impl<R: Read> ByteSource for IoSource<R> {
    fn can_read(&self) -> bool {
        !self.eof
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(k) => filled += k,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        buf.truncate(filled);
        self.position += filled as u64;
        Ok(buf)
    }
}

/// Reads a stream of entries against a schema selected by the stream's
/// version byte.
///
/// A decoder is a finite lazy sequence: iterate it (or call [`read_entry`])
/// to pull entries one at a time. A short read in the middle of an entry
/// discards the partial entry and ends the sequence cleanly; the format has
/// no end marker, so truncation is how every stream ends. One consequence is
/// that a trailing variable-length field cut off at end-of-stream is
/// indistinguishable from a missing entry, and is treated as the latter.
///
/// Decode errors inside block codecs (such as malformed UTF-8) surface as
/// `Err` items and also end the sequence.
///
/// [`read_entry`]: Decoder::read_entry
pub struct Decoder<'a, S: ByteSource> {
    schema: &'a Schema,
    source: S,
    custom_info: Option<Vec<u8>>,
    count: u32,
    prev: Option<Entry>,
    done: bool,
}

impl<'a, S: ByteSource> Decoder<'a, S> {
    /// Read and validate the stream header against `set`, which may be a
    /// single [`Schema`] or a [`MultiSchema`]. Fails with `VersionMismatch`
    /// when no schema accepts the stream's version byte.
    ///
    /// [`MultiSchema`]: crate::MultiSchema
    pub fn new<T: SchemaSet + ?Sized>(set: &'a T, source: S) -> Result<Self> {
        Self::start(source, |version| {
            set.select(version)
                .ok_or(Error::VersionMismatch { version })
        })
    }

    /// Read the stream header without validating the version byte, trusting
    /// the caller's schema.
    pub fn new_unchecked(schema: &'a Schema, source: S) -> Result<Self> {
        Self::start(source, |_| Ok(schema))
    }

    fn start<F>(mut source: S, select: F) -> Result<Self>
    where
        F: FnOnce(u8) -> Result<&'a Schema>,
    {
        let version = source.read_bytes(1)?;
        let version = *version
            .first()
            .ok_or_else(|| Error::BadDecode("stream ended before the version byte".into()))?;
        let schema = select(version)?;
        let custom_info = match schema.custom_header() {
            Some(header) => {
                let info = source.read_bytes(header.byte_length())?;
                if info.len() < header.byte_length() {
                    return Err(Error::BadDecode(
                        "stream ended inside the custom header".into(),
                    ));
                }
                Some(info)
            }
            None => None,
        };
        Ok(Self {
            schema,
            source,
            custom_info,
            count: 0,
            prev: None,
            done: false,
        })
    }

    /// The schema selected by the stream's version byte.
    pub fn schema(&self) -> &Schema {
        self.schema
    }

    /// The raw custom header bytes read from the stream, if the schema
    /// declares a custom header.
    pub fn custom_info(&self) -> Option<&[u8]> {
        self.custom_info.as_deref()
    }

    /// Pull the next entry. `Ok(None)` means the stream ended cleanly,
    /// including mid-entry truncation.
    pub fn read_entry(&mut self) -> Result<Option<Entry>> {
        if self.done {
            return Ok(None);
        }
        match self.next_entry() {
            Ok(Some(entry)) => Ok(Some(entry)),
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    fn next_entry(&mut self) -> Result<Option<Entry>> {
        let blocks = self.schema.blocks();
        if blocks.is_empty() {
            return Ok(None);
        }
        let interval = self
            .schema
            .stream_compression()
            .map(|s| s.i_frame_interval());
        let i_frame = interval.is_none() || self.count == 0;
        let mut values = Vec::with_capacity(blocks.len());
        for (i, block) in blocks.iter().enumerate() {
            let value = match block.compression() {
                Some(compression) if !i_frame => {
                    let n = compression.p_frame_byte_length();
                    let bytes = self.source.read_bytes(n)?;
                    if bytes.len() < n {
                        return Ok(None);
                    }
                    let prev = self.prev.as_ref().ok_or_else(|| {
                        Error::BadDecode("P-frame without a preceding entry".into())
                    })?;
                    compression.decompress(&prev[i], &bytes)?
                }
                _ => match block.byte_length() {
                    Some(n) => {
                        let bytes = self.source.read_bytes(n)?;
                        if bytes.len() < n {
                            return Ok(None);
                        }
                        block.decode(&bytes)?
                    }
                    None => {
                        let mut payload = Vec::new();
                        loop {
                            let byte = self.source.read_bytes(1)?;
                            match byte.first() {
                                None => return Ok(None),
                                Some(0) => break,
                                Some(&b) => payload.push(b),
                            }
                        }
                        block.decode(&payload)?
                    }
                },
            };
            values.push(value);
        }
        if let Some(k) = interval {
            self.count += 1;
            if self.count == k {
                self.count = 0;
            }
        }
        let entry = Entry::new(values);
        self.prev = Some(entry.clone());
        Ok(Some(entry))
    }

    /// Adapt this decoder into an iterator of typed records.
    pub fn records<T: Record + Default>(self) -> Records<'a, S, T> {
        Records {
            decoder: self,
            _marker: PhantomData,
        }
    }
}

impl<S: ByteSource> Iterator for Decoder<'_, S> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_entry().transpose()
    }
}

/// Iterator of typed records built over a [`Decoder`].
pub struct Records<'a, S: ByteSource, T> {
    decoder: Decoder<'a, S>,
    _marker: PhantomData<fn() -> T>,
}

impl<S: ByteSource, T: Record + Default> Iterator for Records<'_, S, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = match self.decoder.read_entry().transpose()? {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e)),
        };
        Some(self.decoder.schema.cast_from_entry(&entry))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::{Block, BlockKind};
    use crate::delta::Compression;
    use crate::encode::Encoder;
    use crate::schema::{CustomHeader, MultiSchema, StreamCompression};
    use crate::text::StrEncoding;
    use crate::value::{Primitive, Value};

    fn u8_block(index: u32, name: &str) -> Block {
        Block::new(index, name, BlockKind::Numeric(Primitive::U8))
    }

    fn encode_all(schema: &Schema, entries: &[Entry]) -> Vec<u8> {
        let mut enc = Encoder::new(schema, Vec::new()).unwrap();
        for entry in entries {
            enc.write_entry(entry).unwrap();
        }
        enc.finish()
    }

    fn decode_all(schema: &Schema, bytes: &[u8]) -> Vec<Entry> {
        Decoder::new(schema, SliceSource::new(bytes))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn round_trip_plain() {
        let schema = Schema::new(
            1,
            vec![u8_block(0, "x"), u8_block(1, "y"), u8_block(2, "t")],
        )
        .unwrap();
        let entries: Vec<Entry> = [(10, 20, 3), (11, 22, 3), (12, 24, 3)]
            .iter()
            .map(|&(x, y, t)| Entry::new(vec![Value::U8(x), Value::U8(y), Value::U8(t)]))
            .collect();
        let bytes = encode_all(&schema, &entries);
        assert_eq!(decode_all(&schema, &bytes), entries);
    }

    #[test]
    fn round_trip_i_frame_only() {
        let schema = Schema::new(
            1,
            vec![
                u8_block(0, "x"),
                u8_block(1, "y"),
                u8_block(2, "t").with_compression(Compression::IFrameOnly),
            ],
        )
        .unwrap()
        .with_stream_compression(StreamCompression::new(2).unwrap());
        let entries: Vec<Entry> = [(10, 20, 3), (11, 22, 3), (12, 24, 7), (13, 26, 7)]
            .iter()
            .map(|&(x, y, t)| Entry::new(vec![Value::U8(x), Value::U8(y), Value::U8(t)]))
            .collect();
        let bytes = encode_all(&schema, &entries);
        assert_eq!(decode_all(&schema, &bytes), entries);
    }

    #[test]
    fn round_trip_numeric_delta() {
        let schema = Schema::new(
            1,
            vec![
                u8_block(0, "x").with_compression(Compression::NumericDelta {
                    original: Primitive::U8,
                    delta: Primitive::I8,
                }),
                u8_block(1, "y"),
            ],
        )
        .unwrap()
        .with_stream_compression(StreamCompression::new(3).unwrap());
        let entries: Vec<Entry> = [(100, 0), (105, 0), (95, 0), (95, 0)]
            .iter()
            .map(|&(x, y)| Entry::new(vec![Value::U8(x), Value::U8(y)]))
            .collect();
        let bytes = encode_all(&schema, &entries);
        assert_eq!(decode_all(&schema, &bytes), entries);
    }

    #[test]
    fn round_trip_mixed_variable() {
        let schema = Schema::new(
            5,
            vec![
                Block::new(0, "name", BlockKind::String(StrEncoding::Utf16Le)),
                Block::new(1, "payload", BlockKind::Bytes),
                Block::new(2, "count", BlockKind::Numeric(Primitive::U32)),
            ],
        )
        .unwrap();
        // UTF-16 code units here must avoid zero bytes, which the framing
        // can't carry
        let entries = vec![
            Entry::new(vec![
                Value::from("中文"),
                Value::Binary(vec![1, 2, 3]),
                Value::U32(70_000),
            ]),
            Entry::new(vec![
                Value::from(""),
                Value::Binary(vec![]),
                Value::U32(0),
            ]),
        ];
        let bytes = encode_all(&schema, &entries);
        assert_eq!(decode_all(&schema, &bytes), entries);
    }

    #[test]
    fn truncated_entry_is_discarded() {
        let schema = Schema::new(
            1,
            vec![u8_block(0, "x"), u8_block(1, "y"), u8_block(2, "t")],
        )
        .unwrap();
        let entries: Vec<Entry> = [(1, 2, 3), (4, 5, 6)]
            .iter()
            .map(|&(x, y, t)| Entry::new(vec![Value::U8(x), Value::U8(y), Value::U8(t)]))
            .collect();
        let mut bytes = encode_all(&schema, &entries);
        bytes.pop(); // cut the last field of the last entry
        let decoded = decode_all(&schema, &bytes);
        assert_eq!(decoded, entries[..1]);
    }

    #[test]
    fn empty_stream_yields_nothing() {
        let schema = Schema::new(7, vec![u8_block(0, "x")]).unwrap();
        assert!(decode_all(&schema, &[0x07]).is_empty());
    }

    #[test]
    fn version_mismatch() {
        let schema = Schema::new(1, vec![u8_block(0, "x")]).unwrap();
        match Decoder::new(&schema, SliceSource::new(&[0x02, 0x0A])) {
            Err(Error::VersionMismatch { version: 2 }) => (),
            other => panic!("expected version mismatch, got {:?}", other.err()),
        }
    }

    #[test]
    fn unchecked_skips_version_validation() {
        let schema = Schema::new(1, vec![u8_block(0, "x")]).unwrap();
        let decoder = Decoder::new_unchecked(&schema, SliceSource::new(&[0x63, 0x0A]));
        let entries: Vec<Entry> = decoder.unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(entries, vec![Entry::new(vec![Value::U8(10)])]);
    }

    #[test]
    fn multi_schema_dispatch() {
        let v1 = Schema::new(1, vec![u8_block(0, "x")]).unwrap();
        let v2 = Schema::new(
            2,
            vec![u8_block(0, "x"), u8_block(1, "y")],
        )
        .unwrap();
        let multi = MultiSchema::new(vec![v1, v2]);

        let bytes = [0x02, 0x0A, 0x14];
        let decoder = Decoder::new(&multi, SliceSource::new(&bytes)).unwrap();
        assert_eq!(decoder.schema().version(), 2);
        let entries: Vec<Entry> = decoder.collect::<Result<_>>().unwrap();
        assert_eq!(
            entries,
            vec![Entry::new(vec![Value::U8(10), Value::U8(20)])]
        );

        match Decoder::new(&multi, SliceSource::new(&[0x03])) {
            Err(Error::VersionMismatch { version: 3 }) => (),
            other => panic!("expected version mismatch, got {:?}", other.err()),
        }
    }

    #[test]
    fn custom_info_captured() {
        let schema = Schema::new(1, vec![u8_block(0, "x")])
            .unwrap()
            .with_custom_header(CustomHeader::new(vec![0xDE, 0xAD, 0xBE, 0xEF]));
        let bytes = [0x01, 0xDE, 0xAD, 0xBE, 0xEF, 0x42];
        let mut decoder = Decoder::new(&schema, SliceSource::new(&bytes)).unwrap();
        assert_eq!(decoder.custom_info(), Some(&[0xDE, 0xAD, 0xBE, 0xEF][..]));
        assert_eq!(
            decoder.read_entry().unwrap(),
            Some(Entry::new(vec![Value::U8(0x42)]))
        );
        assert_eq!(decoder.read_entry().unwrap(), None);
    }

    #[test]
    fn decode_error_surfaces_and_ends_iteration() {
        let schema = Schema::new(
            1,
            vec![Block::new(0, "s", BlockKind::String(StrEncoding::Utf8))],
        )
        .unwrap();
        // 0xFF is not valid UTF-8
        let bytes = [0x01, 0xFF, 0x00, 0x68, 0x00];
        let mut decoder = Decoder::new(&schema, SliceSource::new(&bytes)).unwrap();
        assert!(decoder.next().unwrap().is_err());
        assert!(decoder.next().is_none());
    }

    #[test]
    fn slice_source_offset() {
        let schema = Schema::new(1, vec![u8_block(0, "x")]).unwrap();
        let bytes = [0xAA, 0xBB, 0x01, 0x07];
        let source = SliceSource::with_offset(&bytes, 2);
        let entries: Vec<Entry> = Decoder::new(&schema, source)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(entries, vec![Entry::new(vec![Value::U8(7)])]);
    }

    #[test]
    fn io_source_round_trip() {
        let schema = Schema::new(
            3,
            vec![
                Block::new(0, "s", BlockKind::String(StrEncoding::Utf8)),
                Block::new(1, "n", BlockKind::Numeric(Primitive::I16)),
            ],
        )
        .unwrap();
        let entries = vec![
            Entry::new(vec![Value::from("one"), Value::I16(-1)]),
            Entry::new(vec![Value::from("two"), Value::I16(2)]),
        ];
        let bytes = encode_all(&schema, &entries);
        let source = IoSource::new(io::Cursor::new(bytes));
        let decoded: Vec<Entry> = Decoder::new(&schema, source)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(decoded, entries);
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Sample {
        seq: u32,
        tag: String,
    }

    impl Record for Sample {
        fn get(&self, property: &str) -> Option<Value> {
            match property {
                "seq" => Some(Value::U32(self.seq)),
                "tag" => Some(Value::from(self.tag.as_str())),
                _ => None,
            }
        }

        fn set(&mut self, property: &str, value: Value) -> bool {
            match (property, value) {
                ("seq", Value::U32(v)) => self.seq = v,
                ("tag", Value::String(v)) => self.tag = v,
                _ => return false,
            }
            true
        }
    }

    impl crate::record::RecordSchema for Sample {
        const VERSION: u8 = 6;

        fn fields() -> Vec<crate::record::FieldSpec> {
            vec![
                crate::record::FieldSpec::new("seq", BlockKind::Numeric(Primitive::U32))
                    .compressed(Compression::NumericDelta {
                        original: Primitive::U32,
                        delta: Primitive::I16,
                    }),
                crate::record::FieldSpec::new("tag", BlockKind::String(StrEncoding::Utf8)),
            ]
        }

        fn stream_compression() -> Option<StreamCompression> {
            Some(StreamCompression::new(2).unwrap())
        }
    }

    #[test]
    fn typed_records_round_trip() {
        let schema = Schema::from_record::<Sample>().unwrap();
        assert_eq!(schema.version(), 6);

        let samples = vec![
            Sample {
                seq: 100,
                tag: "a".into(),
            },
            Sample {
                seq: 103,
                tag: "b".into(),
            },
            Sample {
                seq: 90,
                tag: "c".into(),
            },
        ];
        let mut enc = Encoder::new(&schema, Vec::new()).unwrap();
        for sample in &samples {
            enc.write_record(sample).unwrap();
        }
        let bytes = enc.finish();

        let decoder = Decoder::new(&schema, SliceSource::new(&bytes)).unwrap();
        let decoded: Vec<Sample> = decoder.records().collect::<Result<_>>().unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn randomized_round_trip() {
        use rand::prelude::*;
        let mut rng = StdRng::seed_from_u64(0x5EED);

        let schema = Schema::new(
            4,
            vec![
                Block::new(0, "a", BlockKind::Numeric(Primitive::I64)),
                Block::new(1, "b", BlockKind::Numeric(Primitive::F64)),
                Block::new(2, "c", BlockKind::Bytes),
                Block::new(3, "d", BlockKind::Numeric(Primitive::U16)),
            ],
        )
        .unwrap();

        let entries: Vec<Entry> = (0..64)
            .map(|_| {
                // Variable payloads must not contain 0x00
                let len = rng.gen_range(0..8);
                let payload: Vec<u8> = (0..len).map(|_| rng.gen_range(1..=255u8)).collect();
                Entry::new(vec![
                    Value::I64(rng.gen()),
                    Value::F64(rng.gen()),
                    Value::Binary(payload),
                    Value::U16(rng.gen()),
                ])
            })
            .collect();

        let bytes = encode_all(&schema, &entries);
        assert_eq!(decode_all(&schema, &bytes), entries);
    }
}
