//! Error types for encoding, type extensions and keys

use crate::extension::WireKind;
use crate::format::Format;
use thiserror::Error;

/// Failure from a codec backend
#[derive(Debug, Error)]
pub enum CodecError {
    /// The value could not be serialized
    #[error("{format} encode failed: {message}")]
    Encode { format: Format, message: String },

    /// The bytes are not a valid encoding of the requested type
    #[error("{format} decode failed: {message}")]
    Decode { format: Format, message: String },

    /// A complete value was decoded but bytes were left over
    #[error("{format} decode left {remaining} trailing bytes")]
    TrailingBytes { format: Format, remaining: usize },
}

impl CodecError {
    pub(crate) fn encode(format: Format, err: impl std::fmt::Display) -> Self {
        Self::Encode {
            format,
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(format: Format, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            format,
            message: err.to_string(),
        }
    }

    /// Format of the codec that produced this error
    pub fn format(&self) -> Format {
        match self {
            Self::Encode { format, .. }
            | Self::Decode { format, .. }
            | Self::TrailingBytes { format, .. } => *format,
        }
    }

    /// True for failures reading bytes back
    pub fn is_decode(&self) -> bool {
        !matches!(self, Self::Encode { .. })
    }
}

/// A format name no backend answers to
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown format: {0}")]
pub struct UnknownFormat(pub String);

/// Failure inside a type extension conversion
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtensionError {
    /// The value has no representation in the extension's wire form
    #[error("{type_name} value is out of range for its wire form")]
    OutOfRange { type_name: &'static str },

    /// The wire value has the wrong shape for this extension
    #[error("expected {expected} wire value, got {actual}")]
    UnexpectedWire { expected: WireKind, actual: WireKind },

    /// The extension was handed a value of another type
    #[error("extension for {expected} received a value of another type")]
    TypeMismatch { expected: &'static str },

    /// Conversion rejected the value
    #[error("{0}")]
    Invalid(String),
}

/// Failure building or reading a type-prefixed key
#[derive(Debug, Error)]
pub enum KeyError {
    /// Type name does not fit the prefix length field
    #[error("type name is {len} bytes, prefix limit is {max}")]
    TypeNameTooLong { len: usize, max: usize },

    /// Key bytes are shorter than the type prefix
    #[error("key of {len} bytes is shorter than the {prefix_len}-byte prefix for type {type_name:?}")]
    ShortBuffer {
        type_name: String,
        len: usize,
        prefix_len: usize,
    },

    /// Key bytes carry another type's prefix
    #[error("key prefix does not belong to type {type_name:?}")]
    PrefixMismatch { type_name: String },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl KeyError {
    /// True when the key bytes could not be read back
    pub fn is_decode_failure(&self) -> bool {
        match self {
            Self::ShortBuffer { .. } | Self::PrefixMismatch { .. } => true,
            Self::Codec(err) => err.is_decode(),
            Self::TypeNameTooLong { .. } => false,
        }
    }
}
