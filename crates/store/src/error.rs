//! Store error types

use codec::{CodecError, Format, KeyError};
use thiserror::Error;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert found an existing record under the key
    #[error("{type_name} record already exists for this key")]
    KeyExists { type_name: &'static str },

    /// No record under the key
    #[error("no {type_name} record for this key")]
    NotFound { type_name: &'static str },

    /// The store holds data written with another format
    #[error("store was written as {stored} but is configured for {configured}; re-encode the data before switching formats")]
    FormatMismatch { stored: String, configured: Format },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("storage engine error: {0}")]
    Engine(#[from] sled::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
