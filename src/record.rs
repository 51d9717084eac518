//! Record binding: how user types expose named properties to a schema.
//!
//! There is no runtime reflection here. A user type implements [`Record`] to
//! read and write its properties by name, and [`RecordSchema`] to describe
//! its fields in declaration order. [`Schema::from_record`] turns that
//! description into a full schema, and `cast_to_entry`/`cast_from_entry`
//! move values across the boundary.
//!
//! [`Schema::from_record`]: crate::Schema::from_record

use crate::block::BlockKind;
use crate::delta::Compression;
use crate::schema::{CustomHeader, StreamCompression};
use crate::value::Value;

/// Anything the codec can read and write named properties on.
///
/// `get` returns the current value of a property, or `None` when the record
/// has no such property. `set` stores a decoded value and reports whether the
/// property was accepted. Both are keyed by the `property_name` strings the
/// schema carries.
pub trait Record {
    fn get(&self, property: &str) -> Option<Value>;
    fn set(&mut self, property: &str, value: Value) -> bool;
}

/// Descriptor for one field of a [`RecordSchema`].
#[derive(Clone, Debug)]
pub struct FieldSpec {
    property_name: String,
    kind: BlockKind,
    compression: Option<Compression>,
}

impl FieldSpec {
    pub fn new(property_name: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            property_name: property_name.into(),
            kind,
            compression: None,
        }
    }

    /// Delta-code this field in P-frame entries.
    pub fn compressed(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
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

    pub(crate) fn into_parts(self) -> (String, BlockKind, Option<Compression>) {
        (self.property_name, self.kind, self.compression)
    }
}

/// A record type that can describe its own schema.
///
/// `fields` lists every codec-visible field in declaration order; that order
/// becomes the authoritative block index. The class-level items mirror the
/// schema's stream-wide settings.
pub trait RecordSchema: Record {
    /// The schema version byte for this record type.
    const VERSION: u8;

    /// Field descriptors in declaration order.
    fn fields() -> Vec<FieldSpec>;

    /// Stream-wide I-frame cadence, if the record type wants one.
    fn stream_compression() -> Option<StreamCompression> {
        None
    }

    /// Fixed custom header bytes, if the record type declares them.
    fn custom_header() -> Option<CustomHeader> {
        None
    }
}
