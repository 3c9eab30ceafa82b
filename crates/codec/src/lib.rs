//! Keyhold codec - pluggable value encoding for byte-keyed storage
//!
//! This crate provides:
//! - Interchangeable binary formats behind one [`Codec`] trait
//!   (MessagePack, CBOR, bincode)
//! - Per-codec type extensions that override structural encoding
//!   (built-in: UTC nanosecond timestamps)
//! - Type-prefixed keys so records of different types share one keyspace
//!
//! # Example
//!
//! ```
//! use codec::{AnyCodec, Format, KeyCodec};
//!
//! let keys = KeyCodec::new(AnyCodec::new(Format::MsgPack));
//! let bytes = keys.encode_key(&42u64, "Person")?;
//! let key: u64 = keys.decode_key(&bytes, "Person")?;
//! assert_eq!(key, 42);
//! # Ok::<(), codec::KeyError>(())
//! ```

pub mod backend;
pub mod error;
pub mod extension;
pub mod format;
pub mod key;
pub mod timestamp;

// Re-exports
pub use backend::{AnyCodec, BincodeCodec, CborCodec, Codec, CodecConfig, MsgPackCodec};
pub use error::{CodecError, ExtensionError, KeyError, UnknownFormat};
pub use extension::{Extensible, Extension, ExtensionRegistry, WireKind, WireValue};
pub use format::Format;
pub use key::{prefix, KeyCodec, PrefixCheck};
pub use timestamp::{Timestamp, TimestampExtension};
