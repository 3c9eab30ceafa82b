//! Store configuration

use anyhow::{Context, Result};
use codec::{CodecConfig, PrefixCheck};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Store configuration
///
/// ```toml
/// prefix_check = "verify"   # or "trust"
///
/// [codec]
/// format = "msgpack"        # "cbor", "bincode"
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Whether decoded keys must carry their own type's prefix (default: verify)
    pub prefix_check: PrefixCheck,

    /// Codec for keys and values (default: msgpack)
    pub codec: CodecConfig,
}

impl StoreConfig {
    /// Parse from TOML text; missing fields take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse store config")
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).context("Failed to serialize store config")
    }
}
