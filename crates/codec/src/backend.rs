//! Codec trait and its binary format backends

use crate::error::CodecError;
use crate::extension::{self, ExtensionRegistry};
use crate::format::Format;
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// Paired encode/decode between values and bytes
///
/// `decode(encode(v)) == v` holds for every value a codec accepts. Encoding
/// is deterministic within a process; nothing is promised across formats.
pub trait Codec: Send + Sync {
    /// Format written by this codec
    fn format(&self) -> Format;

    /// Serialize a value
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Deserialize a value; trailing bytes are an error
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;

    /// Decode into an existing slot, leaving it untouched on failure
    fn decode_into<T: DeserializeOwned>(&self, bytes: &[u8], out: &mut T) -> Result<(), CodecError> {
        *out = self.decode(bytes)?;
        Ok(())
    }
}

impl<C: Codec> Codec for &C {
    fn format(&self) -> Format {
        (**self).format()
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        (**self).encode(value)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        (**self).decode(bytes)
    }
}

fn check_trailing(format: Format, total: usize, consumed: u64) -> Result<(), CodecError> {
    let remaining = total.saturating_sub(consumed as usize);
    if remaining > 0 {
        return Err(CodecError::TrailingBytes { format, remaining });
    }
    Ok(())
}

/// MessagePack backend (`rmp-serde`), structs written as maps
#[derive(Debug, Clone)]
pub struct MsgPackCodec {
    registry: Arc<ExtensionRegistry>,
}

impl MsgPackCodec {
    pub fn new() -> Self {
        Self::with_registry(ExtensionRegistry::with_defaults())
    }

    pub fn with_registry(registry: ExtensionRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }
}

impl Default for MsgPackCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for MsgPackCodec {
    fn format(&self) -> Format {
        Format::MsgPack
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let _scope = extension::enter(&self.registry);
        rmp_serde::to_vec_named(value).map_err(|e| CodecError::encode(Format::MsgPack, e))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let _scope = extension::enter(&self.registry);
        let mut de = rmp_serde::Deserializer::new(Cursor::new(bytes));
        let value = T::deserialize(&mut de).map_err(|e| CodecError::decode(Format::MsgPack, e))?;
        check_trailing(Format::MsgPack, bytes.len(), de.get_ref().position())?;
        Ok(value)
    }
}

/// CBOR backend (`ciborium`)
#[derive(Debug, Clone)]
pub struct CborCodec {
    registry: Arc<ExtensionRegistry>,
}

impl CborCodec {
    pub fn new() -> Self {
        Self::with_registry(ExtensionRegistry::with_defaults())
    }

    pub fn with_registry(registry: ExtensionRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }
}

impl Default for CborCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for CborCodec {
    fn format(&self) -> Format {
        Format::Cbor
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let _scope = extension::enter(&self.registry);
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf).map_err(|e| CodecError::encode(Format::Cbor, e))?;
        Ok(buf)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let _scope = extension::enter(&self.registry);
        let mut cursor = Cursor::new(bytes);
        let value = ciborium::from_reader(&mut cursor).map_err(|e| CodecError::decode(Format::Cbor, e))?;
        check_trailing(Format::Cbor, bytes.len(), cursor.position())?;
        Ok(value)
    }
}

/// bincode backend: fixed-width little-endian integers, trailing bytes rejected
#[derive(Debug, Clone)]
pub struct BincodeCodec {
    registry: Arc<ExtensionRegistry>,
}

impl BincodeCodec {
    pub fn new() -> Self {
        Self::with_registry(ExtensionRegistry::with_defaults())
    }

    pub fn with_registry(registry: ExtensionRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    fn options() -> impl Options {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .reject_trailing_bytes()
    }
}

impl Default for BincodeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for BincodeCodec {
    fn format(&self) -> Format {
        Format::Bincode
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let _scope = extension::enter(&self.registry);
        Self::options()
            .serialize(value)
            .map_err(|e| CodecError::encode(Format::Bincode, e))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let _scope = extension::enter(&self.registry);
        Self::options()
            .deserialize(bytes)
            .map_err(|e| CodecError::decode(Format::Bincode, e))
    }
}

/// Codec selection as it appears in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Binary format (default: msgpack)
    pub format: Format,
}

/// A codec chosen at runtime
#[derive(Debug, Clone)]
pub enum AnyCodec {
    MsgPack(MsgPackCodec),
    Cbor(CborCodec),
    Bincode(BincodeCodec),
}

impl AnyCodec {
    /// Codec for `format` with the built-in extensions
    pub fn new(format: Format) -> Self {
        Self::with_registry(format, ExtensionRegistry::with_defaults())
    }

    /// Codec for `format` with a caller-built registry
    pub fn with_registry(format: Format, registry: ExtensionRegistry) -> Self {
        debug!(%format, extensions = registry.len(), "codec initialized");
        match format {
            Format::MsgPack => AnyCodec::MsgPack(MsgPackCodec::with_registry(registry)),
            Format::Cbor => AnyCodec::Cbor(CborCodec::with_registry(registry)),
            Format::Bincode => AnyCodec::Bincode(BincodeCodec::with_registry(registry)),
        }
    }

    pub fn from_config(config: &CodecConfig) -> Self {
        Self::new(config.format)
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        match self {
            AnyCodec::MsgPack(codec) => codec.registry(),
            AnyCodec::Cbor(codec) => codec.registry(),
            AnyCodec::Bincode(codec) => codec.registry(),
        }
    }
}

impl Default for AnyCodec {
    fn default() -> Self {
        Self::new(Format::default())
    }
}

impl Codec for AnyCodec {
    fn format(&self) -> Format {
        match self {
            AnyCodec::MsgPack(codec) => codec.format(),
            AnyCodec::Cbor(codec) => codec.format(),
            AnyCodec::Bincode(codec) => codec.format(),
        }
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            AnyCodec::MsgPack(codec) => codec.encode(value),
            AnyCodec::Cbor(codec) => codec.encode(value),
            AnyCodec::Bincode(codec) => codec.encode(value),
        }
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        match self {
            AnyCodec::MsgPack(codec) => codec.decode(bytes),
            AnyCodec::Cbor(codec) => codec.decode(bytes),
            AnyCodec::Bincode(codec) => codec.decode(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Role {
        Admin,
        Member { since: u32 },
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Person {
        name: String,
        age: u8,
        email: Option<String>,
        tags: Vec<String>,
        scores: BTreeMap<String, i64>,
        role: Role,
        ratio: f64,
    }

    fn sample() -> Person {
        let mut scores = BTreeMap::new();
        scores.insert("chess".to_string(), 1820);
        scores.insert("go".to_string(), -3);
        Person {
            name: "Ada".to_string(),
            age: 36,
            email: Some("ada@example.com".to_string()),
            tags: vec!["math".to_string(), "engines".to_string()],
            scores,
            role: Role::Member { since: 1843 },
            ratio: 0.75,
        }
    }

    #[test]
    fn test_roundtrip_every_format() {
        for format in Format::ALL {
            let codec = AnyCodec::new(format);
            let person = sample();

            let bytes = codec.encode(&person).unwrap();
            let decoded: Person = codec.decode(&bytes).unwrap();
            assert_eq!(decoded, person, "{}", format);

            let admin = Person {
                email: None,
                role: Role::Admin,
                ..sample()
            };
            let bytes = codec.encode(&admin).unwrap();
            assert_eq!(codec.decode::<Person>(&bytes).unwrap(), admin, "{}", format);
        }
    }

    #[test]
    fn test_roundtrip_primitives() {
        for format in Format::ALL {
            let codec = AnyCodec::new(format);
            assert_eq!(codec.decode::<u64>(&codec.encode(&42u64).unwrap()).unwrap(), 42);
            assert_eq!(codec.decode::<i32>(&codec.encode(&-7i32).unwrap()).unwrap(), -7);
            assert_eq!(
                codec.decode::<String>(&codec.encode("key").unwrap()).unwrap(),
                "key"
            );
            assert_eq!(
                codec.decode::<Vec<u8>>(&codec.encode(&vec![1u8, 2, 3]).unwrap()).unwrap(),
                vec![1, 2, 3]
            );
            assert_eq!(
                codec
                    .decode::<(bool, char)>(&codec.encode(&(true, 'x')).unwrap())
                    .unwrap(),
                (true, 'x')
            );
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        for format in Format::ALL {
            let codec = AnyCodec::new(format);
            assert_eq!(
                codec.encode(&sample()).unwrap(),
                codec.encode(&sample()).unwrap(),
                "{}",
                format
            );
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        for format in Format::ALL {
            let codec = AnyCodec::new(format);
            let mut bytes = codec.encode(&7u32).unwrap();
            bytes.push(0);
            let err = codec.decode::<u32>(&bytes).unwrap_err();
            assert!(err.is_decode(), "{}", format);
            assert_eq!(err.format(), format);
        }
    }

    #[test]
    fn test_truncated_input_rejected() {
        for format in Format::ALL {
            let codec = AnyCodec::new(format);
            let bytes = codec.encode(&sample()).unwrap();
            let cut = &bytes[..bytes.len() / 2];
            assert!(codec.decode::<Person>(cut).is_err(), "{}", format);
            assert!(codec.decode::<Person>(&[]).is_err(), "{}", format);
        }
    }

    #[test]
    fn test_incompatible_target_type_rejected() {
        // Only self-describing formats carry the type tags needed to notice
        for format in [Format::MsgPack, Format::Cbor] {
            let codec = AnyCodec::new(format);
            let bytes = codec.encode("not a number").unwrap();
            assert!(codec.decode::<u64>(&bytes).is_err(), "{}", format);

            let bytes = codec.encode(&-1i64).unwrap();
            assert!(codec.decode::<u64>(&bytes).is_err(), "{}", format);
        }
    }

    #[test]
    fn test_bincode_reinterprets_same_width_types() {
        let codec = AnyCodec::new(Format::Bincode);

        let bytes = codec.encode(&-1i64).unwrap();
        assert_eq!(codec.decode::<u64>(&bytes).unwrap(), u64::MAX);

        let bytes = codec.encode(&7u64).unwrap();
        assert_eq!(codec.decode::<(u32, u32)>(&bytes).unwrap(), (7, 0));

        // A width mismatch still shows up as a length error
        assert!(codec.decode::<u32>(&bytes).is_err());
        assert!(codec.decode::<(u64, u64)>(&bytes).is_err());
    }

    #[test]
    fn test_cross_format_bytes_do_not_decode() {
        let person = sample();
        for writer in Format::ALL {
            let bytes = AnyCodec::new(writer).encode(&person).unwrap();
            for reader in Format::ALL.into_iter().filter(|f| *f != writer) {
                let result = AnyCodec::new(reader).decode::<Person>(&bytes);
                assert!(
                    result.is_err(),
                    "{} bytes decoded as {}: {:?}",
                    writer,
                    reader,
                    result
                );
            }
        }
    }

    #[test]
    fn test_decode_into_keeps_slot_on_error() {
        let codec = MsgPackCodec::new();
        let mut slot = 5u16;
        codec.decode_into(&codec.encode(&9u16).unwrap(), &mut slot).unwrap();
        assert_eq!(slot, 9);

        assert!(codec.decode_into(&[0xc1], &mut slot).is_err());
        assert_eq!(slot, 9);
    }

    #[test]
    fn test_msgpack_writes_field_names() {
        let bytes = MsgPackCodec::new().encode(&sample()).unwrap();
        let needle = b"email";
        assert!(bytes.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn test_bincode_fixed_width_integers() {
        let bytes = BincodeCodec::new().encode(&42u64).unwrap();
        assert_eq!(bytes, 42u64.to_le_bytes().to_vec());
    }

    #[test]
    fn test_config_selects_format() {
        let config = CodecConfig {
            format: Format::Cbor,
        };
        let codec = AnyCodec::from_config(&config);
        assert_eq!(codec.format(), Format::Cbor);
        assert_eq!(AnyCodec::default().format(), Format::MsgPack);
        assert!(!codec.registry().is_empty());
    }

    #[test]
    fn test_codecs_usable_across_threads() {
        let codec = Arc::new(AnyCodec::new(Format::MsgPack));
        let handles: Vec<_> = (0..4u64)
            .map(|i| {
                let codec = Arc::clone(&codec);
                std::thread::spawn(move || {
                    let bytes = codec.encode(&i).unwrap();
                    codec.decode::<u64>(&bytes).unwrap()
                })
            })
            .collect();
        let mut results: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        results.sort_unstable();
        assert_eq!(results, vec![0, 1, 2, 3]);
    }
}
