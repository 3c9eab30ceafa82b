//! Type-prefixed storage keys
//!
//! A stored key is `prefix(type_name) || encode(key)`. The prefix is
//!
//! ```text
//! '#' (1 byte) | name length: u16 big-endian | name: UTF-8 bytes
//! ```
//!
//! The explicit length keeps prefixes of distinct type names from being
//! byte-prefixes of one another, so one flat keyspace can hold every type and
//! a prefix scan over one type never picks up another.

use crate::backend::Codec;
use crate::error::KeyError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Lead byte of every type prefix
pub const TYPE_PREFIX_TAG: u8 = b'#';

/// Longest type name a prefix can carry
pub const MAX_TYPE_NAME_LEN: usize = u16::MAX as usize;

/// Byte prefix for keys of `type_name`
pub fn prefix(type_name: &str) -> Result<Vec<u8>, KeyError> {
    let len = u16::try_from(type_name.len()).map_err(|_| KeyError::TypeNameTooLong {
        len: type_name.len(),
        max: MAX_TYPE_NAME_LEN,
    })?;

    let mut out = Vec::with_capacity(prefix_len(len as usize));
    out.push(TYPE_PREFIX_TAG);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(type_name.as_bytes());
    Ok(out)
}

fn prefix_len(name_len: usize) -> usize {
    1 + 2 + name_len
}

/// How `decode_key` treats the prefix bytes it strips
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixCheck {
    /// Stripped bytes must equal `prefix(type_name)`
    #[default]
    Verify,
    /// Strip by length only; a wrong type name decodes a misaligned payload,
    /// which fails or yields a wrong value
    Trust,
}

/// Encodes keys as `prefix(type_name) || codec.encode(key)`
#[derive(Debug, Clone)]
pub struct KeyCodec<C> {
    codec: C,
    check: PrefixCheck,
}

impl<C: Codec> KeyCodec<C> {
    /// Key codec with prefix verification
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            check: PrefixCheck::default(),
        }
    }

    pub fn with_prefix_check(mut self, check: PrefixCheck) -> Self {
        self.check = check;
        self
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn prefix_check(&self) -> PrefixCheck {
        self.check
    }

    /// Encode `key` under `type_name`
    pub fn encode_key<K: Serialize + ?Sized>(&self, key: &K, type_name: &str) -> Result<Vec<u8>, KeyError> {
        let encoded = self.codec.encode(key)?;
        let mut out = prefix(type_name)?;
        out.extend_from_slice(&encoded);
        Ok(out)
    }

    /// Decode a key written by [`KeyCodec::encode_key`] under `type_name`
    pub fn decode_key<K: DeserializeOwned>(&self, data: &[u8], type_name: &str) -> Result<K, KeyError> {
        let payload = self.strip_prefix(data, type_name)?;
        Ok(self.codec.decode(payload)?)
    }

    /// Split off the type prefix and return the encoded key
    pub fn strip_prefix<'a>(&self, data: &'a [u8], type_name: &str) -> Result<&'a [u8], KeyError> {
        let expected = prefix(type_name)?;
        if data.len() < expected.len() {
            return Err(KeyError::ShortBuffer {
                type_name: type_name.to_string(),
                len: data.len(),
                prefix_len: expected.len(),
            });
        }

        let (head, payload) = data.split_at(expected.len());
        if self.check == PrefixCheck::Verify && head != expected.as_slice() {
            return Err(KeyError::PrefixMismatch {
                type_name: type_name.to_string(),
            });
        }
        Ok(payload)
    }
}
