//! Typed record store on a byte-keyed engine
//!
//! This crate provides:
//! - A small engine boundary ([`KvEngine`]) with sled and in-memory engines
//! - [`Store`]: typed insert/get/update/delete over type-prefixed keys
//! - [`StoreConfig`]: codec and key settings loaded from TOML

pub mod config;
pub mod engine;
pub mod error;
pub mod store;

// Re-exports
pub use config::StoreConfig;
pub use engine::{KeyValue, KvEngine, MemoryEngine, SledEngine};
pub use error::StoreError;
pub use store::{Record, Store};

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
