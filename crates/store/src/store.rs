//! Typed records over type-prefixed keys

use crate::config::StoreConfig;
use crate::engine::{KvEngine, SledEngine};
use crate::error::StoreError;
use codec::{prefix, AnyCodec, Codec, Format, KeyCodec, PrefixCheck};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, trace, warn};

/// Reserved key holding the format the store was written with.
/// The leading zero byte never starts a type prefix.
const FORMAT_MARKER_KEY: &[u8] = b"\x00meta:format";

/// A value stored under its type's key prefix
pub trait Record: Serialize + DeserializeOwned {
    /// Name used for the key prefix; must stay stable once data exists
    const TYPE_NAME: &'static str;
}

/// Typed store
///
/// Keys are `prefix(T::TYPE_NAME) || encode(key)` and values are
/// `encode(record)`, both with the store's codec.
pub struct Store<E: KvEngine = SledEngine> {
    engine: E,
    keys: KeyCodec<AnyCodec>,
}

impl Store<SledEngine> {
    /// Open or create a sled-backed store at `path`
    pub fn open_path(path: &Path, config: &StoreConfig) -> Result<Self, StoreError> {
        Self::open(SledEngine::open(path)?, config)
    }
}

impl<E: KvEngine> Store<E> {
    /// Open a store on `engine` with the codec named in `config`
    pub fn open(engine: E, config: &StoreConfig) -> Result<Self, StoreError> {
        Self::with_codec(engine, AnyCodec::from_config(&config.codec), config.prefix_check)
    }

    /// Open a store with a prebuilt codec
    ///
    /// An empty engine is stamped with the codec's format. An engine stamped
    /// with a different format is rejected: its bytes are unreadable here.
    pub fn with_codec(engine: E, codec: AnyCodec, check: PrefixCheck) -> Result<Self, StoreError> {
        let format = codec.format();
        check_format(&engine, format)?;
        debug!(%format, ?check, "store opened");

        Ok(Self {
            engine,
            keys: KeyCodec::new(codec).with_prefix_check(check),
        })
    }

    /// Insert a record; fails if the key is taken
    pub fn insert<K, T>(&self, key: &K, record: &T) -> Result<(), StoreError>
    where
        K: Serialize + ?Sized,
        T: Record,
    {
        let (key, value) = self.encode_pair(key, record)?;
        if !self.engine.insert_if_absent(&key, value)? {
            return Err(StoreError::KeyExists {
                type_name: T::TYPE_NAME,
            });
        }
        trace!(type_name = T::TYPE_NAME, "record inserted");
        Ok(())
    }

    /// Insert or overwrite a record
    pub fn upsert<K, T>(&self, key: &K, record: &T) -> Result<(), StoreError>
    where
        K: Serialize + ?Sized,
        T: Record,
    {
        let (key, value) = self.encode_pair(key, record)?;
        self.engine.insert(&key, value)?;
        trace!(type_name = T::TYPE_NAME, "record upserted");
        Ok(())
    }

    /// Overwrite an existing record; fails if absent
    pub fn update<K, T>(&self, key: &K, record: &T) -> Result<(), StoreError>
    where
        K: Serialize + ?Sized,
        T: Record,
    {
        let (key, value) = self.encode_pair(key, record)?;
        if !self.engine.replace(&key, value)? {
            return Err(StoreError::NotFound {
                type_name: T::TYPE_NAME,
            });
        }
        trace!(type_name = T::TYPE_NAME, "record updated");
        Ok(())
    }

    /// Get a record by key
    pub fn get<T, K>(&self, key: &K) -> Result<T, StoreError>
    where
        T: Record,
        K: Serialize + ?Sized,
    {
        let key = self.keys.encode_key(key, T::TYPE_NAME)?;
        let value = self.engine.get(&key)?.ok_or(StoreError::NotFound {
            type_name: T::TYPE_NAME,
        })?;
        Ok(self.keys.codec().decode(&value)?)
    }

    /// Delete a record; fails if absent
    pub fn delete<T, K>(&self, key: &K) -> Result<(), StoreError>
    where
        T: Record,
        K: Serialize + ?Sized,
    {
        let key = self.keys.encode_key(key, T::TYPE_NAME)?;
        if self.engine.remove(&key)?.is_none() {
            return Err(StoreError::NotFound {
                type_name: T::TYPE_NAME,
            });
        }
        trace!(type_name = T::TYPE_NAME, "record deleted");
        Ok(())
    }

    /// All records of type `T` with their keys
    pub fn find_all<T, K>(&self) -> Result<Vec<(K, T)>, StoreError>
    where
        T: Record,
        K: DeserializeOwned,
    {
        let prefix = prefix(T::TYPE_NAME)?;
        self.engine
            .scan_prefix(&prefix)?
            .into_iter()
            .map(|(key, value)| -> Result<(K, T), StoreError> {
                let key = self.keys.decode_key(&key, T::TYPE_NAME)?;
                let record = self.keys.codec().decode(&value)?;
                Ok((key, record))
            })
            .collect()
    }

    /// All keys of type `T`
    pub fn keys<T, K>(&self) -> Result<Vec<K>, StoreError>
    where
        T: Record,
        K: DeserializeOwned,
    {
        let prefix = prefix(T::TYPE_NAME)?;
        self.engine
            .scan_prefix(&prefix)?
            .into_iter()
            .map(|(key, _)| {
                self.keys
                    .decode_key(&key, T::TYPE_NAME)
                    .map_err(StoreError::from)
            })
            .collect()
    }

    /// Number of records of type `T`
    pub fn count<T: Record>(&self) -> Result<usize, StoreError> {
        let prefix = prefix(T::TYPE_NAME)?;
        self.engine.count_prefix(&prefix)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.engine.flush()
    }

    pub fn format(&self) -> Format {
        self.keys.codec().format()
    }

    pub fn codec(&self) -> &AnyCodec {
        self.keys.codec()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    fn encode_pair<K, T>(&self, key: &K, record: &T) -> Result<(Vec<u8>, Vec<u8>), StoreError>
    where
        K: Serialize + ?Sized,
        T: Record,
    {
        let key = self.keys.encode_key(key, T::TYPE_NAME)?;
        let value = self.keys.codec().encode(record)?;
        Ok((key, value))
    }
}

fn check_format<E: KvEngine>(engine: &E, format: Format) -> Result<(), StoreError> {
    match engine.get(FORMAT_MARKER_KEY)? {
        Some(stored) => {
            let stored = String::from_utf8_lossy(&stored);
            if stored != format.as_str() {
                warn!(%stored, configured = %format, "store format mismatch");
                return Err(StoreError::FormatMismatch {
                    stored: stored.into_owned(),
                    configured: format,
                });
            }
        }
        None => {
            engine.insert(FORMAT_MARKER_KEY, format.as_str().as_bytes().to_vec())?;
            debug!(%format, "stamped store format");
        }
    }
    Ok(())
}
