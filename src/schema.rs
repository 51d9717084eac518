//! Schemas: the immutable description of an entry stream's shape.

use crate::block::{Block, BlockKind};
use crate::delta::Compression;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::record::{Record, RecordSchema};

/// Stream-wide temporal compression settings.
///
/// Every `i_frame_interval`-th entry is an I-frame; the entries between carry
/// delta-coded fields. An interval below 2 would make every entry an I-frame
/// and is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamCompression {
    i_frame_interval: u32,
}

impl StreamCompression {
    pub fn new(i_frame_interval: u32) -> Result<Self> {
        if i_frame_interval < 2 {
            return Err(Error::InvalidSchema(format!(
                "I-frame interval must be at least 2, got {}",
                i_frame_interval
            )));
        }
        Ok(Self { i_frame_interval })
    }

    pub fn i_frame_interval(&self) -> u32 {
        self.i_frame_interval
    }
}

/// A fixed-length byte region written verbatim between the version byte and
/// the entry stream. Opaque to the codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomHeader {
    info: Vec<u8>,
}

impl CustomHeader {
    /// Declare a custom header whose default contents are `info`. The
    /// declared length is `info.len()`; an encoder may override the contents
    /// but never the length.
    pub fn new(info: Vec<u8>) -> Self {
        Self { info }
    }

    pub fn byte_length(&self) -> usize {
        self.info.len()
    }

    pub fn info(&self) -> &[u8] {
        &self.info
    }
}

/// An immutable schema: a version byte, blocks in ascending index order, and
/// the optional stream-wide settings.
///
/// Construction is the single validation point. Once built, a schema is
/// borrowed by encoders and decoders for their lifetime and never changes.
#[derive(Clone, Debug)]
pub struct Schema {
    version: u8,
    blocks: Vec<Block>,
    stream_compression: Option<StreamCompression>,
    custom_header: Option<CustomHeader>,
}

impl Schema {
    /// Build a schema from a version byte and a set of blocks.
    ///
    /// Blocks are sorted into ascending index order. Fails if two blocks
    /// share an index or a property name, if a property name is empty, or if
    /// a block's compression doesn't suit its type.
    pub fn new(version: u8, mut blocks: Vec<Block>) -> Result<Self> {
        blocks.sort_by_key(|b| b.index());
        for pair in blocks.windows(2) {
            if pair[0].index() == pair[1].index() {
                return Err(Error::InvalidSchema(format!(
                    "duplicate block index {}",
                    pair[0].index()
                )));
            }
        }
        for (i, block) in blocks.iter().enumerate() {
            if block.property_name().is_empty() {
                return Err(Error::InvalidSchema(format!(
                    "block at index {} has an empty property name",
                    block.index()
                )));
            }
            if blocks[..i]
                .iter()
                .any(|b| b.property_name() == block.property_name())
            {
                return Err(Error::InvalidSchema(format!(
                    "duplicate property name \"{}\"",
                    block.property_name()
                )));
            }
            if let Some(compression) = block.compression() {
                compression.validate()?;
                check_compression_suits_block(block, compression)?;
            }
        }
        Ok(Self {
            version,
            blocks,
            stream_compression: None,
            custom_header: None,
        })
    }

    /// Attach stream-wide I-frame cadence settings.
    pub fn with_stream_compression(mut self, stream_compression: StreamCompression) -> Self {
        self.stream_compression = Some(stream_compression);
        self
    }

    /// Attach a custom header declaration.
    pub fn with_custom_header(mut self, custom_header: CustomHeader) -> Self {
        self.custom_header = Some(custom_header);
        self
    }

    /// Build a schema from a record type's own description. Field declaration
    /// order becomes the block index order.
    pub fn from_record<T: RecordSchema>() -> Result<Self> {
        let blocks = T::fields()
            .into_iter()
            .enumerate()
            .map(|(i, field)| {
                let (name, kind, compression) = field.into_parts();
                let mut block = Block::new(i as u32, name, kind);
                if let Some(compression) = compression {
                    block = block.with_compression(compression);
                }
                block
            })
            .collect();
        let mut schema = Schema::new(T::VERSION, blocks)?;
        schema.stream_compression = T::stream_compression();
        schema.custom_header = T::custom_header();
        Ok(schema)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Blocks in ascending index order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn stream_compression(&self) -> Option<&StreamCompression> {
        self.stream_compression.as_ref()
    }

    pub fn custom_header(&self) -> Option<&CustomHeader> {
        self.custom_header.as_ref()
    }

    /// Whether this schema accepts a stream's version byte.
    pub fn validate_version(&self, version: u8) -> bool {
        version == self.version
    }

    /// Read each block's property out of `record` into an entry, in block
    /// order. Fails if a property is absent or carries the wrong value type.
    pub fn cast_to_entry(&self, record: &dyn Record) -> Result<Entry> {
        let mut values = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let value = record.get(block.property_name()).ok_or_else(|| {
                Error::PropertyBinding {
                    property: block.property_name().to_string(),
                    reason: "record has no such property",
                }
            })?;
            if !block.kind().accepts(&value) {
                return Err(Error::PropertyBinding {
                    property: block.property_name().to_string(),
                    reason: "value type doesn't match the block type",
                });
            }
            values.push(value);
        }
        Ok(Entry::new(values))
    }

    /// Construct a fresh record and write each entry value back into its
    /// named property.
    pub fn cast_from_entry<T: Record + Default>(&self, entry: &Entry) -> Result<T> {
        if entry.len() != self.blocks.len() {
            return Err(Error::BadDecode(format!(
                "entry has {} values, schema has {} blocks",
                entry.len(),
                self.blocks.len()
            )));
        }
        let mut record = T::default();
        for (block, value) in self.blocks.iter().zip(entry) {
            if !record.set(block.property_name(), value.clone()) {
                return Err(Error::PropertyBinding {
                    property: block.property_name().to_string(),
                    reason: "record rejected the value",
                });
            }
        }
        Ok(record)
    }
}

fn check_compression_suits_block(block: &Block, compression: &Compression) -> Result<()> {
    if let Compression::NumericDelta { original, .. } = compression {
        match block.kind() {
            BlockKind::Numeric(prim) if prim == original => Ok(()),
            BlockKind::Numeric(prim) => Err(Error::InvalidSchema(format!(
                "block \"{}\" is {} but its delta declares original type {}",
                block.property_name(),
                prim.name(),
                original.name()
            ))),
            _ => Err(Error::InvalidSchema(format!(
                "block \"{}\" isn't numeric and can't be delta-coded",
                block.property_name()
            ))),
        }
    } else {
        Ok(())
    }
}

/// Anything a decoder can resolve a stream version against.
///
/// Selection is immutable: the implementation returns a reference to the
/// schema that accepts the version, and the decoder uses that reference for
/// the remainder of the stream.
pub trait SchemaSet {
    fn select(&self, version: u8) -> Option<&Schema>;
}

impl SchemaSet for Schema {
    fn select(&self, version: u8) -> Option<&Schema> {
        if self.validate_version(version) {
            Some(self)
        } else {
            None
        }
    }
}

/// An ordered collection of schemas keyed by version byte.
///
/// During encoding the caller picks one schema directly; a multi-version set
/// holds no selection state. During decoding, the first schema accepting the
/// stream's version byte is used.
#[derive(Clone, Debug, Default)]
pub struct MultiSchema {
    schemas: Vec<Schema>,
}

impl MultiSchema {
    pub fn new(schemas: Vec<Schema>) -> Self {
        Self { schemas }
    }

    pub fn push(&mut self, schema: Schema) {
        self.schemas.push(schema);
    }

    pub fn schemas(&self) -> &[Schema] {
        &self.schemas
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl SchemaSet for MultiSchema {
    fn select(&self, version: u8) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.validate_version(version))
    }
}
