//! Atomic write batches.

use std::sync::Arc;

use bytes::Bytes;
use common::{RecordOp, Storage};

use crate::error::{Error, Result};
use crate::storage::{delete_ops, set_ops, validate_key, validate_value};

/// A group of writes applied together in one atomic transaction.
///
/// Mutations are buffered locally and sent only when the batch is written.
/// Each queued set registers the key in the ordering index before storing its
/// value; each queued delete removes the index entry before the value.
///
/// A batch is single-use. After [`write`](Self::write) or
/// [`close`](Self::close), every further call to `set`, `delete`, `write` or
/// `write_sync` fails with [`Error::BatchClosed`].
///
/// # Example
///
/// ```ignore
/// let mut batch = kv.new_batch();
/// batch.set(Bytes::from("a"), Bytes::from("1"))?;
/// batch.delete(Bytes::from("b"))?;
/// batch.write().await?;
/// ```
pub struct WriteBatch {
    storage: Arc<dyn Storage>,
    index: Bytes,
    ops: Option<Vec<RecordOp>>,
    mutations: usize,
}

impl WriteBatch {
    pub(crate) fn new(storage: Arc<dyn Storage>, index: Bytes) -> Self {
        Self {
            storage,
            index,
            ops: Some(Vec::new()),
            mutations: 0,
        }
    }

    /// Queues a write of `value` at `key`.
    ///
    /// An empty value is allowed; `None` is rejected with
    /// [`Error::InvalidValue`].
    pub fn set(&mut self, key: Bytes, value: impl Into<Option<Bytes>>) -> Result<()> {
        let ops = self.ops.as_mut().ok_or(Error::BatchClosed)?;
        validate_key(&key, &self.index)?;
        let value = validate_value(value.into())?;
        ops.extend(set_ops(&self.index, key, value));
        self.mutations += 1;
        Ok(())
    }

    /// Queues the removal of `key`.
    pub fn delete(&mut self, key: Bytes) -> Result<()> {
        let ops = self.ops.as_mut().ok_or(Error::BatchClosed)?;
        validate_key(&key, &self.index)?;
        ops.extend(delete_ops(&self.index, key));
        self.mutations += 1;
        Ok(())
    }

    /// Applies every queued mutation atomically and closes the batch.
    ///
    /// The batch is closed even if the transaction fails.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn write(&mut self) -> Result<()> {
        let ops = self.ops.take().ok_or(Error::BatchClosed)?;
        if ops.is_empty() {
            return Ok(());
        }
        let mutations = std::mem::take(&mut self.mutations);
        self.storage.transaction(ops).await.inspect_err(|err| {
            tracing::debug!(mutations, error = %err, "batch write failed");
        })?;
        tracing::debug!(mutations, "batch written");
        Ok(())
    }

    /// Same as [`write`](Self::write).
    pub async fn write_sync(&mut self) -> Result<()> {
        self.write().await
    }

    /// Discards queued mutations and closes the batch. Idempotent.
    pub fn close(&mut self) {
        self.ops = None;
        self.mutations = 0;
    }

    /// Number of queued mutations.
    pub fn len(&self) -> usize {
        self.mutations
    }

    pub fn is_empty(&self) -> bool {
        self.mutations == 0
    }
}
