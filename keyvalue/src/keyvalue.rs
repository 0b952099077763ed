//! Core KeyValueDb implementation with read and write APIs.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use common::storage::factory::create_storage;
use common::ScanOrder;

use crate::batch::WriteBatch;
use crate::config::Config;
use crate::error::Result;
use crate::iterator::KeyValueIterator;
use crate::reader::KeyValueRead;
use crate::storage::KeyValueStorage;

/// The main key-value interface providing read and write operations.
///
/// `KeyValueDb` is the primary entry point for interacting with the key-value
/// store. Keys live in the store's plain key space; a sorted-set index at
/// [`Config::index_key`] keeps them in byte order so that ranges can be
/// iterated.
///
/// # Read Operations
///
/// Read operations are provided via the [`KeyValueRead`] trait, which `KeyValueDb`
/// implements. This allows generic code to work with either `KeyValueDb` or
/// [`KeyValueDbReader`](crate::KeyValueDbReader).
///
/// # Durability
///
/// Every write is acknowledged by the store before it returns, so
/// [`set_sync`](Self::set_sync) and [`delete_sync`](Self::delete_sync) behave
/// exactly like their plain counterparts.
///
/// # Thread Safety
///
/// `KeyValueDb` is designed to be shared across threads. All methods except
/// [`close`](Self::close) take `&self`.
///
/// # Example
///
/// ```ignore
/// use redis_keyvalue::{KeyValueDb, KeyValueRead, Config};
/// use bytes::Bytes;
///
/// let kv = KeyValueDb::open(config).await?;
///
/// kv.set(Bytes::from("user:123"), Bytes::from("alice")).await?;
///
/// let value = kv.get(Bytes::from("user:123")).await?;
/// assert_eq!(value, Some(Bytes::from("alice")));
///
/// kv.delete(Bytes::from("user:123")).await?;
/// ```
pub struct KeyValueDb {
    storage: KeyValueStorage,
}

impl KeyValueDb {
    /// Opens a key-value store with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`](crate::Error::InvalidInput) for an
    /// invalid configuration, or a storage error if the backend cannot be
    /// reached.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let storage = create_storage(&config.storage).await?;
        tracing::debug!(
            page_size = config.page_size,
            pagination = ?config.pagination,
            "opened key-value store"
        );
        Ok(Self {
            storage: KeyValueStorage::new(storage, config),
        })
    }

    /// Creates a KeyValueDb from an existing storage implementation.
    #[cfg(test)]
    pub(crate) fn new(storage: std::sync::Arc<dyn common::Storage>, config: Config) -> Self {
        Self {
            storage: KeyValueStorage::new(storage, config),
        }
    }

    /// Stores `value` at `key`, overwriting any existing value.
    ///
    /// An empty value is stored as such. An expiry already set on the key by
    /// another client is preserved.
    ///
    /// The value and the index entry are sent in one pipelined round trip
    /// but not atomically; use a [`WriteBatch`] for all-or-nothing writes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`](crate::Error::InvalidKey) for an empty or
    /// reserved key and [`Error::InvalidValue`](crate::Error::InvalidValue)
    /// for an absent value.
    pub async fn set(&self, key: Bytes, value: impl Into<Option<Bytes>> + Send) -> Result<()> {
        self.storage.set(key, value.into()).await
    }

    /// Same as [`set`](Self::set).
    pub async fn set_sync(&self, key: Bytes, value: impl Into<Option<Bytes>> + Send) -> Result<()> {
        self.set(key, value).await
    }

    /// Deletes a key. No-op if key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`](crate::Error::InvalidKey) for an empty or
    /// reserved key.
    pub async fn delete(&self, key: Bytes) -> Result<()> {
        self.storage.delete(key).await
    }

    /// Same as [`delete`](Self::delete).
    pub async fn delete_sync(&self, key: Bytes) -> Result<()> {
        self.delete(key).await
    }

    /// Creates an empty batch bound to this store.
    pub fn new_batch(&self) -> WriteBatch {
        self.storage.new_batch()
    }

    /// Returns the backend's runtime statistics as a flat field map.
    pub async fn stats(&self) -> Result<HashMap<String, String>> {
        self.storage.stats().await
    }

    /// Removes every key in the backing database, including keys this store
    /// did not write.
    pub async fn unsafe_reset(&self) -> Result<()> {
        tracing::warn!("flushing every key in the backing database");
        self.storage.reset().await
    }

    /// Logs the statistics report and every stored pair at debug level.
    ///
    /// Returns the number of pairs logged. Meant for debugging small stores.
    pub async fn dump(&self) -> Result<usize> {
        let stats = self.stats().await?;
        tracing::debug!(?stats, "store statistics");

        let mut iter = self.iterator(None, None).await?;
        let mut pairs = 0;
        while iter.valid() {
            tracing::debug!(key = ?iter.key(), value = ?iter.value(), "stored pair");
            pairs += 1;
            iter.next().await;
        }
        if let Some(err) = iter.error() {
            return Err(err.clone());
        }
        iter.close().await?;
        Ok(pairs)
    }

    /// Closes the store and releases its connection.
    pub async fn close(self) -> Result<()> {
        self.storage.close().await
    }
}

#[async_trait]
impl KeyValueRead for KeyValueDb {
    async fn get(&self, key: Bytes) -> Result<Option<Bytes>> {
        self.storage.as_read().get(&key).await
    }

    async fn iterator(&self, start: Option<Bytes>, end: Option<Bytes>) -> Result<KeyValueIterator> {
        self.storage
            .as_read()
            .iterator(start, end, ScanOrder::Ascending)
            .await
    }

    async fn reverse_iterator(
        &self,
        start: Option<Bytes>,
        end: Option<Bytes>,
    ) -> Result<KeyValueIterator> {
        self.storage
            .as_read()
            .iterator(start, end, ScanOrder::Descending)
            .await
    }
}
