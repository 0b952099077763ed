//! Read-only key-value access and the [`KeyValueRead`] trait.

use async_trait::async_trait;
use bytes::Bytes;
use common::storage::factory::create_storage_read;
use common::ScanOrder;

use crate::config::Config;
use crate::error::Result;
use crate::iterator::KeyValueIterator;
use crate::storage::KeyValueStorageRead;

/// Trait for read operations on the key-value store.
///
/// This trait defines the common read interface shared by both
/// [`KeyValueDb`](crate::KeyValueDb) and [`KeyValueDbReader`].
#[async_trait]
pub trait KeyValueRead: Send + Sync {
    /// Gets the value for a key, or None if not found.
    async fn get(&self, key: Bytes) -> Result<Option<Bytes>>;

    /// Returns true if the key holds a value.
    async fn has(&self, key: Bytes) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Iterates keys in `[start, end)` in ascending byte order.
    ///
    /// `None` leaves that side of the range unbounded. A range whose start
    /// is not below its end yields nothing.
    async fn iterator(&self, start: Option<Bytes>, end: Option<Bytes>) -> Result<KeyValueIterator>;

    /// Iterates keys in `[start, end)` in descending byte order.
    async fn reverse_iterator(
        &self,
        start: Option<Bytes>,
        end: Option<Bytes>,
    ) -> Result<KeyValueIterator>;
}

/// A read-only view of the key-value store.
///
/// `KeyValueDbReader` provides access to all read operations via the
/// [`KeyValueRead`] trait, but not write operations.
pub struct KeyValueDbReader {
    storage: KeyValueStorageRead,
}

impl KeyValueDbReader {
    /// Opens a read-only view of the key-value store.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let storage = create_storage_read(&config.storage).await?;
        Ok(Self {
            storage: KeyValueStorageRead::new(storage, &config),
        })
    }

    /// Creates a KeyValueDbReader from an existing storage implementation.
    #[cfg(test)]
    pub(crate) fn new(storage: std::sync::Arc<dyn common::StorageRead>, config: &Config) -> Self {
        Self {
            storage: KeyValueStorageRead::new(storage, config),
        }
    }
}

#[async_trait]
impl KeyValueRead for KeyValueDbReader {
    async fn get(&self, key: Bytes) -> Result<Option<Bytes>> {
        self.storage.get(&key).await
    }

    async fn iterator(&self, start: Option<Bytes>, end: Option<Bytes>) -> Result<KeyValueIterator> {
        self.storage.iterator(start, end, ScanOrder::Ascending).await
    }

    async fn reverse_iterator(
        &self,
        start: Option<Bytes>,
        end: Option<Bytes>,
    ) -> Result<KeyValueIterator> {
        self.storage.iterator(start, end, ScanOrder::Descending).await
    }
}
