//! Byte-keyed storage engines

use crate::error::StoreError;
use parking_lot::RwLock;
use sled::Db;
use std::collections::BTreeMap;
use std::path::Path;

/// A key-value pair returned by prefix scans
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Raw byte key-value engine under a [`Store`](crate::Store)
///
/// Implementations must be thread-safe; the conditional writes must be
/// atomic with respect to each other.
pub trait KvEngine: Send + Sync {
    /// Get the value under `key`
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write `value`, returning the previous value
    fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write `value` only if `key` is absent; false if it was present
    fn insert_if_absent(&self, key: &[u8], value: Vec<u8>) -> Result<bool, StoreError>;

    /// Overwrite `key` only if present; false if it was absent
    fn replace(&self, key: &[u8], value: Vec<u8>) -> Result<bool, StoreError>;

    /// Remove `key`, returning the previous value
    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// All pairs whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KeyValue>, StoreError>;

    /// Number of keys starting with `prefix`, without copying values out
    fn count_prefix(&self, prefix: &[u8]) -> Result<usize, StoreError>;

    /// Flush buffered writes to durable storage
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// On-disk engine backed by sled
pub struct SledEngine {
    db: Db,
}

impl SledEngine {
    /// Open or create a database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Database removed when dropped
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    pub fn from_db(db: Db) -> Self {
        Self { db }
    }
}

impl KvEngine for SledEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.insert(key, value)?.map(|v| v.to_vec()))
    }

    fn insert_if_absent(&self, key: &[u8], value: Vec<u8>) -> Result<bool, StoreError> {
        let swapped = self.db.compare_and_swap(key, None::<&[u8]>, Some(value))?;
        Ok(swapped.is_ok())
    }

    fn replace(&self, key: &[u8], value: Vec<u8>) -> Result<bool, StoreError> {
        loop {
            let current = match self.db.get(key)? {
                Some(current) => current,
                None => return Ok(false),
            };
            // Retry if another writer got in between the read and the swap
            if self
                .db
                .compare_and_swap(key, Some(current), Some(value.clone()))?
                .is_ok()
            {
                return Ok(true);
            }
        }
    }

    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.remove(key)?.map(|v| v.to_vec()))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KeyValue>, StoreError> {
        self.db
            .scan_prefix(prefix)
            .map(|item| -> Result<KeyValue, StoreError> {
                let (key, value) = item?;
                Ok((key.to_vec(), value.to_vec()))
            })
            .collect()
    }

    fn count_prefix(&self, prefix: &[u8]) -> Result<usize, StoreError> {
        let mut count = 0;
        for key in self.db.scan_prefix(prefix).keys() {
            key?;
            count += 1;
        }
        Ok(count)
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

/// In-memory engine for tests and ephemeral stores
#[derive(Debug, Default)]
pub struct MemoryEngine {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl KvEngine for MemoryEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.map.read().get(key).cloned())
    }

    fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.map.write().insert(key.to_vec(), value))
    }

    fn insert_if_absent(&self, key: &[u8], value: Vec<u8>) -> Result<bool, StoreError> {
        let mut map = self.map.write();
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(key.to_vec(), value);
        Ok(true)
    }

    fn replace(&self, key: &[u8], value: Vec<u8>) -> Result<bool, StoreError> {
        match self.map.write().get_mut(key) {
            Some(slot) => {
                *slot = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.map.write().remove(key))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KeyValue>, StoreError> {
        let map = self.map.read();
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn count_prefix(&self, prefix: &[u8]) -> Result<usize, StoreError> {
        let map = self.map.read();
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .count())
    }
}
