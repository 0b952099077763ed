//! Ordered range iteration driven by the ordering index.
//!
//! A [`KeyValueIterator`] owns a background producer task. The producer
//! pages through the index window, resolves each page of keys with one bulk
//! lookup, and pushes the resulting pairs into a bounded channel that the
//! iterator drains. The channel holds at most one page, so the producer
//! runs at most one page ahead of the consumer.

use std::sync::Arc;

use bytes::Bytes;
use common::{LexQuery, LexRange, ScanOrder, StorageRead};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, Pagination};
use crate::error::{Error, Result};
use crate::model::KeyValueEntry;

/// Index paging parameters shared by every iterator of a store.
#[derive(Debug, Clone)]
pub(crate) struct ScanSettings {
    pub(crate) index: Bytes,
    pub(crate) page_size: usize,
    pub(crate) pagination: Pagination,
}

impl ScanSettings {
    pub(crate) fn from_config(config: &Config) -> Self {
        Self {
            index: Bytes::copy_from_slice(config.index_key.as_bytes()),
            page_size: config.page_size,
            pagination: config.pagination,
        }
    }
}

/// A cursor over the key-value pairs of a half-open key range.
///
/// The cursor is positioned on the first pair as soon as the iterator is
/// returned. Use [`valid`](Self::valid) to check whether it holds a pair,
/// [`key`](Self::key) and [`value`](Self::value) to read it, and
/// [`next`](Self::next) to advance. Pairs arrive in ascending key order, or
/// descending for a reverse iterator.
///
/// Once `valid` returns false it never returns true again. A failure while
/// fetching ends the sequence; [`error`](Self::error) then reports it.
///
/// Dropping the iterator cancels its producer; [`close`](Self::close) also
/// waits for the producer to finish.
///
/// # Example
///
/// ```ignore
/// let mut iter = kv.iterator(Some(Bytes::from("b")), Some(Bytes::from("d"))).await?;
/// while iter.valid() {
///     println!("{:?} = {:?}", iter.key(), iter.value());
///     iter.next().await;
/// }
/// iter.close().await?;
/// ```
pub struct KeyValueIterator {
    start: Option<Bytes>,
    end: Option<Bytes>,
    rx: mpsc::Receiver<Result<KeyValueEntry>>,
    cancel: CancellationToken,
    producer: Option<JoinHandle<()>>,
    current: Option<KeyValueEntry>,
    error: Option<Error>,
}

impl KeyValueIterator {
    /// Spawns the producer and waits for the first pair, if any.
    pub(crate) async fn open(
        storage: Arc<dyn StorageRead>,
        settings: ScanSettings,
        start: Option<Bytes>,
        end: Option<Bytes>,
        order: ScanOrder,
    ) -> Self {
        let (tx, rx) = mpsc::channel(settings.page_size);
        let cancel = CancellationToken::new();

        let producer = Producer {
            storage,
            index: settings.index,
            window: LexRange::from_keys(start.clone(), end.clone()),
            order,
            page_size: settings.page_size,
            pagination: settings.pagination,
            tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(producer.run());

        let mut iter = Self {
            start,
            end,
            rx,
            cancel,
            producer: Some(handle),
            current: None,
            error: None,
        };
        iter.advance().await;
        iter
    }

    /// Returns the `(start, end)` bounds this iterator was created with.
    pub fn domain(&self) -> (Option<&Bytes>, Option<&Bytes>) {
        (self.start.as_ref(), self.end.as_ref())
    }

    /// Returns true if the cursor holds a pair.
    pub fn valid(&self) -> bool {
        self.error.is_none() && self.current.is_some()
    }

    /// Returns the key at the cursor.
    ///
    /// # Panics
    ///
    /// Panics if the iterator is not [`valid`](Self::valid).
    pub fn key(&self) -> &Bytes {
        &self.entry().key
    }

    /// Returns the value at the cursor.
    ///
    /// # Panics
    ///
    /// Panics if the iterator is not [`valid`](Self::valid).
    pub fn value(&self) -> &Bytes {
        &self.entry().value
    }

    /// Moves the cursor to the next pair, waiting for it to be fetched.
    ///
    /// # Panics
    ///
    /// Panics if the iterator is not [`valid`](Self::valid).
    pub async fn next(&mut self) {
        self.entry();
        self.advance().await;
    }

    /// Returns the failure that ended the sequence early, if any.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Stops the producer and invalidates the cursor.
    ///
    /// Discards any prefetched pairs and waits until the producer task has
    /// exited. Calling `close` again is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        self.cancel.cancel();
        self.rx.close();
        while self.rx.recv().await.is_some() {}
        self.current = None;

        if let Some(handle) = self.producer.take() {
            handle
                .await
                .map_err(|e| Error::Internal(format!("iterator producer failed: {}", e)))?;
        }
        Ok(())
    }

    fn entry(&self) -> &KeyValueEntry {
        match (&self.current, &self.error) {
            (Some(entry), None) => entry,
            _ => panic!("iterator is invalid"),
        }
    }

    async fn advance(&mut self) {
        match self.rx.recv().await {
            Some(Ok(entry)) => self.current = Some(entry),
            Some(Err(err)) => {
                self.current = None;
                self.error = Some(err);
            }
            None => self.current = None,
        }
    }
}

impl Drop for KeyValueIterator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Background task feeding an iterator's channel.
struct Producer {
    storage: Arc<dyn StorageRead>,
    index: Bytes,
    window: LexRange,
    order: ScanOrder,
    page_size: usize,
    pagination: Pagination,
    tx: mpsc::Sender<Result<KeyValueEntry>>,
    cancel: CancellationToken,
}

impl Producer {
    async fn run(mut self) {
        // any exit, including a failed send, marks the scan as finished
        let _guard = self.cancel.clone().drop_guard();
        let mut offset = 0;

        loop {
            let query = LexQuery::new(self.window.clone(), self.order, offset, self.page_size);
            let keys = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("iterator cancelled");
                    return;
                }
                keys = self.storage.range_by_lex(self.index.clone(), query) => keys,
            };
            let keys = match keys {
                Ok(keys) if keys.is_empty() => {
                    tracing::debug!("iterator exhausted");
                    return;
                }
                Ok(keys) => keys,
                Err(err) => return self.fail(err.into()).await,
            };

            let values = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("iterator cancelled");
                    return;
                }
                values = self.storage.get_many(keys.clone()) => values,
            };
            let values = match values {
                Ok(values) if values.len() == keys.len() => values,
                Ok(values) => {
                    let err = Error::Internal(format!(
                        "bulk lookup returned {} values for {} keys",
                        values.len(),
                        keys.len()
                    ));
                    return self.fail(err).await;
                }
                Err(err) => return self.fail(err.into()).await,
            };

            let page_len = keys.len();
            let last = keys[page_len - 1].clone();
            for (key, value) in keys.into_iter().zip(values) {
                let Some(value) = value else {
                    // removed or expired between the index query and the lookup
                    tracing::warn!(key = ?key, "indexed key has no value, skipping");
                    continue;
                };
                if !self.send(Ok(KeyValueEntry { key, value })).await {
                    return;
                }
            }

            if page_len < self.page_size {
                tracing::debug!("iterator exhausted");
                return;
            }
            match self.pagination {
                Pagination::Offset => offset += page_len,
                Pagination::KeyCursor => {
                    self.window = match self.order {
                        ScanOrder::Ascending => self.window.after(last),
                        ScanOrder::Descending => self.window.before(last),
                    };
                }
            }
        }
    }

    /// Delivers an item, returning false if the iterator went away first.
    async fn send(&self, item: Result<KeyValueEntry>) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }

    async fn fail(&self, err: Error) {
        tracing::debug!(error = %err, "iterator producer failed");
        self.send(Err(err)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use common::storage::in_memory::{FailingStorage, InMemoryStorage};
    use common::{Storage, StorageError, StorageResult};

    use super::*;
    use crate::storage::set_ops;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn settings(page_size: usize, pagination: Pagination) -> ScanSettings {
        ScanSettings {
            index: b("__index__"),
            page_size,
            pagination,
        }
    }

    async fn storage_with(keys: &[&str]) -> Arc<InMemoryStorage> {
        let storage = Arc::new(InMemoryStorage::new());
        let index = b("__index__");
        let mut ops = Vec::new();
        for key in keys {
            ops.extend(set_ops(&index, b(key), Bytes::from(format!("v-{}", key))));
        }
        storage.pipeline(ops).await.unwrap();
        storage
    }

    async fn drain(iter: &mut KeyValueIterator) -> Vec<Bytes> {
        let mut keys = Vec::new();
        while iter.valid() {
            assert_eq!(iter.value(), &Bytes::from(format!("v-{}", String::from_utf8_lossy(iter.key()))));
            keys.push(iter.key().clone());
            iter.next().await;
        }
        keys
    }

    /// Counts range queries, to observe how far the producer got.
    struct CountingStorage {
        inner: Arc<dyn StorageRead>,
        range_calls: AtomicUsize,
    }

    #[async_trait]
    impl StorageRead for CountingStorage {
        async fn get(&self, key: Bytes) -> StorageResult<Option<Bytes>> {
            self.inner.get(key).await
        }

        async fn get_many(&self, keys: Vec<Bytes>) -> StorageResult<Vec<Option<Bytes>>> {
            self.inner.get_many(keys).await
        }

        async fn range_by_lex(&self, index: Bytes, query: LexQuery) -> StorageResult<Vec<Bytes>> {
            self.range_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.range_by_lex(index, query).await
        }

        async fn info(&self, section: &str) -> StorageResult<String> {
            self.inner.info(section).await
        }
    }

    #[tokio::test]
    async fn should_iterate_across_pages_with_key_cursor() {
        // given
        let storage = storage_with(&["a", "b", "c", "d", "e"]).await;

        // when
        let mut iter = KeyValueIterator::open(
            storage,
            settings(2, Pagination::KeyCursor),
            None,
            None,
            ScanOrder::Ascending,
        )
        .await;

        // then
        assert_eq!(drain(&mut iter).await, vec![b("a"), b("b"), b("c"), b("d"), b("e")]);
        assert!(iter.error().is_none());
    }

    #[tokio::test]
    async fn should_iterate_across_pages_with_offset() {
        // given
        let storage = storage_with(&["a", "b", "c", "d", "e"]).await;

        // when
        let mut iter = KeyValueIterator::open(
            storage,
            settings(2, Pagination::Offset),
            Some(b("b")),
            None,
            ScanOrder::Descending,
        )
        .await;

        // then
        assert_eq!(drain(&mut iter).await, vec![b("e"), b("d"), b("c"), b("b")]);
    }

    #[tokio::test]
    async fn should_reverse_across_pages_with_key_cursor() {
        // given
        let storage = storage_with(&["a", "b", "c", "d", "e"]).await;

        // when
        let mut iter = KeyValueIterator::open(
            storage,
            settings(2, Pagination::KeyCursor),
            None,
            Some(b("e")),
            ScanOrder::Descending,
        )
        .await;

        // then
        assert_eq!(drain(&mut iter).await, vec![b("d"), b("c"), b("b"), b("a")]);
    }

    #[tokio::test]
    async fn should_stop_after_short_page() {
        // given
        let storage = Arc::new(CountingStorage {
            inner: storage_with(&["a", "b", "c"]).await,
            range_calls: AtomicUsize::new(0),
        });

        // when
        let mut iter = KeyValueIterator::open(
            storage.clone(),
            settings(2, Pagination::KeyCursor),
            None,
            None,
            ScanOrder::Ascending,
        )
        .await;
        let keys = drain(&mut iter).await;
        iter.close().await.unwrap();

        // then
        assert_eq!(keys, vec![b("a"), b("b"), b("c")]);
        assert_eq!(storage.range_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn should_not_skip_keys_inserted_before_cursor_during_scan() {
        // given
        let storage = storage_with(&["b", "d", "f", "h"]).await;
        let mut iter = KeyValueIterator::open(
            storage.clone(),
            settings(1, Pagination::KeyCursor),
            None,
            None,
            ScanOrder::Ascending,
        )
        .await;
        assert_eq!(iter.key(), &b("b"));

        // when - shift every rank after "b" while the first page is buffered
        storage
            .pipeline(set_ops(&b("__index__"), b("a"), b("v-a")).into())
            .await
            .unwrap();
        let keys = drain(&mut iter).await;

        // then - the next page resumes after "d" rather than at rank 2
        assert_eq!(keys, vec![b("b"), b("d"), b("f"), b("h")]);
    }

    #[tokio::test]
    async fn should_skip_indexed_key_without_value() {
        // given
        let storage = storage_with(&["a", "b", "c"]).await;
        storage
            .pipeline(vec![common::RecordOp::Delete(b("b"))])
            .await
            .unwrap();

        // when
        let mut iter = KeyValueIterator::open(
            storage,
            settings(10, Pagination::KeyCursor),
            None,
            None,
            ScanOrder::Ascending,
        )
        .await;

        // then
        assert_eq!(drain(&mut iter).await, vec![b("a"), b("c")]);
    }

    #[tokio::test]
    async fn should_be_invalid_immediately_for_empty_window() {
        // given
        let storage = storage_with(&["x"]).await;

        // when
        let iter = KeyValueIterator::open(
            storage,
            settings(10, Pagination::KeyCursor),
            Some(b("x")),
            Some(b("x")),
            ScanOrder::Ascending,
        )
        .await;

        // then
        assert!(!iter.valid());
        assert!(iter.error().is_none());
        assert_eq!(iter.domain(), (Some(&b("x")), Some(&b("x"))));
    }

    #[tokio::test]
    async fn should_surface_range_failure_as_end_with_error() {
        // given
        let inner = storage_with(&["a", "b"]).await;
        let storage = FailingStorage::wrap(inner);
        storage.fail_range_once(StorageError::Storage("connection reset".into()));

        // when
        let iter = KeyValueIterator::open(
            storage,
            settings(10, Pagination::KeyCursor),
            None,
            None,
            ScanOrder::Ascending,
        )
        .await;

        // then
        assert!(!iter.valid());
        assert_eq!(
            iter.error(),
            Some(&Error::Storage("connection reset".to_string()))
        );
    }

    #[tokio::test]
    async fn should_deliver_earlier_pages_before_lookup_failure() {
        // given
        let inner = storage_with(&["a", "b", "c"]).await;
        let storage = FailingStorage::wrap(inner);
        let mut iter = KeyValueIterator::open(
            storage.clone(),
            settings(1, Pagination::KeyCursor),
            None,
            None,
            ScanOrder::Ascending,
        )
        .await;

        // when - the producer holds "b" waiting for room, so the failure
        // hits the lookup of the third page
        storage.fail_get_many(StorageError::Storage("timeout".into()));
        let keys = drain(&mut iter).await;

        // then
        assert_eq!(keys, vec![b("a"), b("b")]);
        assert!(!iter.valid());
        assert_eq!(iter.error(), Some(&Error::Storage("timeout".to_string())));
    }

    #[tokio::test]
    #[should_panic(expected = "iterator is invalid")]
    async fn should_panic_on_key_of_exhausted_iterator() {
        let storage = storage_with(&[]).await;
        let iter = KeyValueIterator::open(
            storage,
            settings(10, Pagination::KeyCursor),
            None,
            None,
            ScanOrder::Ascending,
        )
        .await;

        iter.key();
    }

    #[tokio::test]
    #[should_panic(expected = "iterator is invalid")]
    async fn should_panic_on_next_after_close() {
        let storage = storage_with(&["a"]).await;
        let mut iter = KeyValueIterator::open(
            storage,
            settings(10, Pagination::KeyCursor),
            None,
            None,
            ScanOrder::Ascending,
        )
        .await;
        iter.close().await.unwrap();

        iter.next().await;
    }

    #[tokio::test]
    async fn should_stop_producer_on_close() {
        // given
        let keys: Vec<String> = (0..100).map(|i| format!("k{:03}", i)).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let storage = Arc::new(CountingStorage {
            inner: storage_with(&key_refs).await,
            range_calls: AtomicUsize::new(0),
        });
        let mut iter = KeyValueIterator::open(
            storage.clone(),
            settings(5, Pagination::KeyCursor),
            None,
            None,
            ScanOrder::Ascending,
        )
        .await;
        assert!(iter.valid());

        // when
        iter.close().await.unwrap();
        let calls_after_close = storage.range_calls.load(Ordering::SeqCst);
        tokio::task::yield_now().await;

        // then
        assert!(!iter.valid());
        assert!(iter.producer.is_none());
        assert!(calls_after_close < 20);
        assert_eq!(storage.range_calls.load(Ordering::SeqCst), calls_after_close);
        iter.close().await.unwrap();
    }

    #[tokio::test]
    async fn should_cancel_producer_on_drop() {
        // given
        let storage = storage_with(&["a", "b", "c", "d"]).await;
        let iter = KeyValueIterator::open(
            storage,
            settings(1, Pagination::KeyCursor),
            None,
            None,
            ScanOrder::Ascending,
        )
        .await;
        let cancel = iter.cancel.clone();

        // when
        drop(iter);

        // then
        assert!(cancel.is_cancelled());
    }
}
