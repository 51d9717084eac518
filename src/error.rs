//! Library error types.

use std::fmt;
use std::io;

/// A framepack Result, normally returning a framepack [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A framepack error. Encompasses any issue that can happen while building a
/// schema, binding records, or encoding and decoding entry streams.
#[derive(Debug)]
pub enum Error {
    /// A block or compression codec was handed a primitive type it does not
    /// support.
    UnsupportedType(String),
    /// A block or compression codec produced a different number of bytes than
    /// its declared length.
    LengthMismatch {
        /// The declared byte length
        expected: usize,
        /// The number of bytes actually produced
        actual: usize,
    },
    /// The stream's version byte was rejected by every schema available to
    /// the decoder.
    VersionMismatch {
        /// The version byte read from the stream
        version: u8,
    },
    /// A record property could not be read or written during entry casting.
    PropertyBinding {
        /// The property name from the schema block
        property: String,
        /// Why the binding failed
        reason: &'static str,
    },
    /// The schema's textual form failed to parse as JSON.
    MalformedJson(serde_json::Error),
    /// A block or compression kind name in the schema's textual form matched
    /// no built-in kind and no user hook.
    UnknownKind(String),
    /// The caller supplied custom header bytes whose length differs from the
    /// length the schema declares.
    CustomInfoLengthMismatch {
        /// The declared custom header length
        expected: usize,
        /// The length of the supplied bytes
        actual: usize,
    },
    /// The schema violates a structural invariant, like a duplicate block
    /// index or an empty property name.
    InvalidSchema(String),
    /// A value could not be encoded, like a non-ASCII string in an ASCII
    /// block or an entry whose length doesn't match the schema.
    BadEncode(String),
    /// Decoded bytes were malformed for their block type, like invalid UTF-8
    /// in a string block.
    BadDecode(String),
    /// The underlying sink or source failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::UnsupportedType(ref ty) => write!(f, "Unsupported type: {}", ty),
            Error::LengthMismatch { expected, actual } => write!(
                f,
                "Codec produced {} bytes, declared length is {}",
                actual, expected
            ),
            Error::VersionMismatch { version } => {
                write!(f, "No schema accepts stream version {}", version)
            }
            Error::PropertyBinding {
                ref property,
                reason,
            } => write!(f, "Property \"{}\" failed to bind: {}", property, reason),
            Error::MalformedJson(ref err) => write!(f, "Malformed schema JSON: {}", err),
            Error::UnknownKind(ref kind) => write!(f, "Unknown block kind: {}", kind),
            Error::CustomInfoLengthMismatch { expected, actual } => write!(
                f,
                "Custom header info is {} bytes, schema declares {}",
                actual, expected
            ),
            Error::InvalidSchema(ref err) => write!(f, "Invalid schema: {}", err),
            Error::BadEncode(ref err) => write!(f, "Encoding failure: {}", err),
            Error::BadDecode(ref err) => write!(f, "Decoding failure: {}", err),
            Error::Io(ref err) => write!(f, "I/O failure: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::MalformedJson(ref err) => Some(err),
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedJson(e)
    }
}
