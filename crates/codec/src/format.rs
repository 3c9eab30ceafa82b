//! Binary format identifiers

use crate::error::UnknownFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The binary format a codec writes
///
/// Bytes written in one format are not readable in another. Switching the
/// format of a store that already holds data requires re-encoding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// MessagePack: compact, self-describing records
    #[default]
    MsgPack,
    /// CBOR: schema-less tag/length/value encoding
    Cbor,
    /// bincode: Rust-native, positional, not self-describing
    ///
    /// Bytes carry no type tags. Decoding into a different type of the same
    /// width succeeds with a reinterpreted value (`-1i64` reads back as
    /// `u64::MAX`); only length mismatches are caught.
    Bincode,
}

impl Format {
    /// All supported formats
    pub const ALL: [Format; 3] = [Format::MsgPack, Format::Cbor, Format::Bincode];

    /// Stable lowercase name, used in config files and store metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::MsgPack => "msgpack",
            Format::Cbor => "cbor",
            Format::Bincode => "bincode",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_roundtrip() {
        for format in Format::ALL {
            assert_eq!(format.as_str().parse::<Format>().unwrap(), format);
        }
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!("gob".parse::<Format>(), Err(UnknownFormat("gob".to_string())));
        assert!("MsgPack".parse::<Format>().is_err());

        let err = "json".parse::<Format>().unwrap_err();
        assert_eq!(err.to_string(), "unknown format: json");
    }

    #[test]
    fn test_default_is_msgpack() {
        assert_eq!(Format::default(), Format::MsgPack);
    }
}
