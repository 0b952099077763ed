//! KeyValue-specific storage wrappers.
//!
//! This module provides [`KeyValueStorage`] and [`KeyValueStorageRead`] which wrap
//! the underlying storage traits and keep the ordering index in step with
//! every write.
//!
//! Every live key `k` has a value record at `k` and is a member of the
//! sorted set at the index key. Writes touch both in a single round trip.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use common::{Record, RecordOp, ScanOrder, Storage, StorageRead};

use crate::batch::WriteBatch;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::iterator::{KeyValueIterator, ScanSettings};
use crate::stats::parse_stats;

/// Rejects empty keys and the reserved index key.
pub(crate) fn validate_key(key: &[u8], index: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidKey("key must not be empty".to_string()));
    }
    if key == index {
        return Err(Error::InvalidKey(format!(
            "key {:?} is reserved for the ordering index",
            String::from_utf8_lossy(key)
        )));
    }
    Ok(())
}

/// Unwraps a value to be written, rejecting the absent value.
pub(crate) fn validate_value(value: Option<Bytes>) -> Result<Bytes> {
    value.ok_or_else(|| Error::InvalidValue("value must not be absent".to_string()))
}

/// Rejects a range bound that is present but empty.
pub(crate) fn validate_bound(bound: Option<&Bytes>) -> Result<()> {
    match bound {
        Some(key) if key.is_empty() => Err(Error::InvalidKey(
            "range bound must be absent or non-empty".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Commands that store `value` at `key` and register `key` in the index.
///
/// The put keeps any expiry already set on the key.
pub(crate) fn set_ops(index: &Bytes, key: Bytes, value: Bytes) -> [RecordOp; 2] {
    [
        RecordOp::IndexAdd {
            index: index.clone(),
            member: key.clone(),
        },
        RecordOp::Put(Record::new(key, value).into()),
    ]
}

/// Commands that remove `key` and its index entry.
pub(crate) fn delete_ops(index: &Bytes, key: Bytes) -> [RecordOp; 2] {
    [
        RecordOp::IndexRemove {
            index: index.clone(),
            member: key.clone(),
        },
        RecordOp::Delete(key),
    ]
}

/// Read-only key-value storage operations.
///
/// Wraps `Arc<dyn StorageRead>` with validation and index-driven iteration.
#[derive(Clone)]
pub(crate) struct KeyValueStorageRead {
    storage: Arc<dyn StorageRead>,
    settings: ScanSettings,
}

impl KeyValueStorageRead {
    /// Creates a new read-only storage wrapper.
    pub(crate) fn new(storage: Arc<dyn StorageRead>, config: &Config) -> Self {
        Self {
            storage,
            settings: ScanSettings::from_config(config),
        }
    }

    /// Gets a value by user key.
    pub(crate) async fn get(&self, key: &Bytes) -> Result<Option<Bytes>> {
        validate_key(key, &self.settings.index)?;
        Ok(self.storage.get(key.clone()).await?)
    }

    /// Starts an iterator over `[start, end)` in the given order.
    pub(crate) async fn iterator(
        &self,
        start: Option<Bytes>,
        end: Option<Bytes>,
        order: ScanOrder,
    ) -> Result<KeyValueIterator> {
        validate_bound(start.as_ref())?;
        validate_bound(end.as_ref())?;
        Ok(KeyValueIterator::open(
            Arc::clone(&self.storage),
            self.settings.clone(),
            start,
            end,
            order,
        )
        .await)
    }
}

/// Read-write key-value storage operations.
///
/// Wraps `Arc<dyn Storage>` and issues index-maintaining writes.
#[derive(Clone)]
pub(crate) struct KeyValueStorage {
    storage: Arc<dyn Storage>,
    config: Config,
}

impl KeyValueStorage {
    /// Creates a new storage wrapper.
    pub(crate) fn new(storage: Arc<dyn Storage>, config: Config) -> Self {
        Self { storage, config }
    }

    /// Returns a read-only view of this storage.
    pub(crate) fn as_read(&self) -> KeyValueStorageRead {
        KeyValueStorageRead::new(
            Arc::clone(&self.storage) as Arc<dyn StorageRead>,
            &self.config,
        )
    }

    fn index(&self) -> Bytes {
        Bytes::copy_from_slice(self.config.index_key.as_bytes())
    }

    /// Stores a value and indexes its key in one pipelined round trip.
    #[tracing::instrument(level = "trace", skip_all)]
    pub(crate) async fn set(&self, key: Bytes, value: Option<Bytes>) -> Result<()> {
        let index = self.index();
        validate_key(&key, &index)?;
        let value = validate_value(value)?;
        self.storage
            .pipeline(set_ops(&index, key, value).into())
            .await?;
        Ok(())
    }

    /// Removes a value and its index entry in one pipelined round trip.
    #[tracing::instrument(level = "trace", skip_all)]
    pub(crate) async fn delete(&self, key: Bytes) -> Result<()> {
        let index = self.index();
        validate_key(&key, &index)?;
        self.storage.pipeline(delete_ops(&index, key).into()).await?;
        Ok(())
    }

    pub(crate) fn new_batch(&self) -> WriteBatch {
        WriteBatch::new(Arc::clone(&self.storage), self.index())
    }

    /// Fetches and parses the store's statistics report.
    pub(crate) async fn stats(&self) -> Result<HashMap<String, String>> {
        let report = self.storage.info("stats").await?;
        Ok(parse_stats(&report))
    }

    /// Removes every key, including the index.
    pub(crate) async fn reset(&self) -> Result<()> {
        self.storage.flush_all().await?;
        Ok(())
    }

    pub(crate) async fn close(&self) -> Result<()> {
        self.storage.close().await?;
        Ok(())
    }
}
