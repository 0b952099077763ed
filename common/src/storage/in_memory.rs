use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use super::{PutRecordOp, RecordOp, Storage, StorageRead};
use crate::{BytesRange, LexQuery, ScanOrder, StorageError, StorageResult, Ttl};

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// Trait for providing the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time as milliseconds since the Unix epoch.
    fn now(&self) -> i64;
}

/// Clock implementation that returns the real system time.
pub struct WallClock;

impl Clock for WallClock {
    fn now(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}

/// What a key holds: a plain value or a sorted-set index.
#[derive(Clone, Debug)]
enum StoredData {
    Value(Bytes),
    Index(BTreeSet<Bytes>),
}

/// Internal wrapper that stores data alongside its expiration timestamp.
#[derive(Clone, Debug)]
struct StoredValue {
    data: StoredData,
    /// `None` means the value never expires.
    expire_ts: Option<i64>,
}

impl StoredValue {
    fn is_expired(&self, now: i64) -> bool {
        self.expire_ts.is_some_and(|ts| now >= ts)
    }
}

#[derive(Default)]
struct Counters {
    commands: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Counters {
    fn command(&self, n: usize) {
        self.commands.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn lookup(&self, found: bool) {
        if found {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

type Keyspace = HashMap<Bytes, StoredValue>;

/// In-memory implementation of the Storage trait.
///
/// Emulates a single logical database of a key-value server: one key space
/// in which a key holds either a plain value or a sorted set whose members
/// are ordered by their raw bytes. Supports per-key expiry via a
/// configurable [`Clock`].
pub struct InMemoryStorage {
    data: Arc<RwLock<Keyspace>>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl InMemoryStorage {
    /// Creates a new InMemoryStorage instance with an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            clock: Arc::new(WallClock),
            counters: Counters::default(),
        }
    }

    /// Sets a custom clock for TTL expiration checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets an expiry of `ttl_ms` milliseconds on a live key.
    ///
    /// Returns false if the key does not exist.
    pub fn expire(&self, key: &[u8], ttl_ms: u64) -> StorageResult<bool> {
        let mut data = self.write_lock()?;
        let now = self.clock.now();
        match data.get_mut(key) {
            Some(stored) if !stored.is_expired(now) => {
                stored.expire_ts = Some(now + ttl_ms as i64);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Returns the remaining time to live of a key in milliseconds.
    ///
    /// `None` if the key is absent or has no expiry.
    pub fn ttl_ms(&self, key: &[u8]) -> StorageResult<Option<i64>> {
        let data = self.read_lock()?;
        let now = self.clock.now();
        Ok(data
            .get(key)
            .filter(|stored| !stored.is_expired(now))
            .and_then(|stored| stored.expire_ts)
            .map(|ts| ts - now))
    }

    /// Returns every live key holding a plain value, in byte order.
    pub fn value_keys(&self) -> StorageResult<Vec<Bytes>> {
        let data = self.read_lock()?;
        let now = self.clock.now();
        let mut keys: Vec<Bytes> = data
            .iter()
            .filter(|(_, stored)| !stored.is_expired(now))
            .filter(|(_, stored)| matches!(stored.data, StoredData::Value(_)))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Returns every member of the sorted set at `index`, in byte order.
    ///
    /// Empty if the index is absent or expired.
    pub fn index_members(&self, index: &[u8]) -> StorageResult<Vec<Bytes>> {
        let data = self.read_lock()?;
        match Self::live(&data, index, self.clock.now()) {
            None => Ok(Vec::new()),
            Some(StoredValue {
                data: StoredData::Index(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(StorageError::Storage(WRONG_TYPE.into())),
        }
    }

    fn read_lock(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, Keyspace>> {
        self.data
            .read()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write_lock(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, Keyspace>> {
        self.data
            .write()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire write lock: {}", e)))
    }

    fn live<'a>(data: &'a Keyspace, key: &[u8], now: i64) -> Option<&'a StoredValue> {
        data.get(key).filter(|stored| !stored.is_expired(now))
    }

    fn apply_op(data: &mut Keyspace, op: RecordOp, now: i64) -> StorageResult<()> {
        // drop an expired entry first so every command sees it as absent
        let key = match &op {
            RecordOp::Put(put) => &put.record.key,
            RecordOp::Delete(key) => key,
            RecordOp::IndexAdd { index, .. } | RecordOp::IndexRemove { index, .. } => index,
        };
        if data.get(key).is_some_and(|stored| stored.is_expired(now)) {
            data.remove(key);
        }

        match op {
            RecordOp::Put(PutRecordOp { record, options }) => {
                let expire_ts = match options.ttl {
                    Ttl::Keep => data.get(&record.key).and_then(|stored| stored.expire_ts),
                    Ttl::NoExpiry => None,
                    Ttl::ExpireAfter(ms) => Some(now + ms as i64),
                };
                data.insert(
                    record.key,
                    StoredValue {
                        data: StoredData::Value(record.value),
                        expire_ts,
                    },
                );
            }
            RecordOp::Delete(key) => {
                data.remove(&key);
            }
            RecordOp::IndexAdd { index, member } => {
                let stored = data.entry(index).or_insert_with(|| StoredValue {
                    data: StoredData::Index(BTreeSet::new()),
                    expire_ts: None,
                });
                match &mut stored.data {
                    StoredData::Index(members) => {
                        members.insert(member);
                    }
                    StoredData::Value(_) => return Err(StorageError::Storage(WRONG_TYPE.into())),
                }
            }
            RecordOp::IndexRemove { index, member } => {
                let now_empty = match data.get_mut(&index) {
                    None => false,
                    Some(StoredValue {
                        data: StoredData::Index(members),
                        ..
                    }) => {
                        members.remove(&member);
                        members.is_empty()
                    }
                    Some(_) => return Err(StorageError::Storage(WRONG_TYPE.into())),
                };
                if now_empty {
                    data.remove(&index);
                }
            }
        }
        Ok(())
    }

    fn stats_report(&self) -> String {
        format!(
            "# Stats\r\ntotal_commands_processed:{}\r\nkeyspace_hits:{}\r\nkeyspace_misses:{}\r\n",
            self.counters.commands.load(Ordering::Relaxed),
            self.counters.hits.load(Ordering::Relaxed),
            self.counters.misses.load(Ordering::Relaxed),
        )
    }

    fn keyspace_report(&self) -> StorageResult<String> {
        let data = self.read_lock()?;
        let now = self.clock.now();
        let live: Vec<&StoredValue> = data.values().filter(|s| !s.is_expired(now)).collect();
        if live.is_empty() {
            return Ok("# Keyspace\r\n".to_string());
        }
        let expires = live.iter().filter(|s| s.expire_ts.is_some()).count();
        Ok(format!(
            "# Keyspace\r\ndb0:keys={},expires={},avg_ttl=0\r\n",
            live.len(),
            expires
        ))
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageRead for InMemoryStorage {
    /// Retrieves a single value by key.
    ///
    /// Returns `None` if the key does not exist or has expired.
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: Bytes) -> StorageResult<Option<Bytes>> {
        self.counters.command(1);
        let data = self.read_lock()?;
        let value = match Self::live(&data, &key, self.clock.now()) {
            None => None,
            Some(StoredValue {
                data: StoredData::Value(value),
                ..
            }) => Some(value.clone()),
            Some(_) => return Err(StorageError::Storage(WRONG_TYPE.into())),
        };
        self.counters.lookup(value.is_some());
        Ok(value)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn get_many(&self, keys: Vec<Bytes>) -> StorageResult<Vec<Option<Bytes>>> {
        self.counters.command(1);
        let data = self.read_lock()?;
        let now = self.clock.now();
        let values = keys
            .iter()
            .map(|key| match Self::live(&data, key, now) {
                Some(StoredValue {
                    data: StoredData::Value(value),
                    ..
                }) => {
                    self.counters.lookup(true);
                    Some(value.clone())
                }
                _ => {
                    self.counters.lookup(false);
                    None
                }
            })
            .collect();
        Ok(values)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn range_by_lex(&self, index: Bytes, query: LexQuery) -> StorageResult<Vec<Bytes>> {
        self.counters.command(1);
        if query.range.is_empty() {
            return Ok(Vec::new());
        }
        let data = self.read_lock()?;
        let members = match Self::live(&data, &index, self.clock.now()) {
            None => return Ok(Vec::new()),
            Some(StoredValue {
                data: StoredData::Index(members),
                ..
            }) => members,
            Some(_) => return Err(StorageError::Storage(WRONG_TYPE.into())),
        };

        let window = members.range(BytesRange::from(&query.range));
        let page = match query.order {
            ScanOrder::Ascending => window
                .skip(query.offset)
                .take(query.count)
                .cloned()
                .collect(),
            ScanOrder::Descending => window
                .rev()
                .skip(query.offset)
                .take(query.count)
                .cloned()
                .collect(),
        };
        Ok(page)
    }

    async fn info(&self, section: &str) -> StorageResult<String> {
        // the report does not include the INFO command itself
        let report = match section.to_ascii_lowercase().as_str() {
            "stats" => self.stats_report(),
            "keyspace" => self.keyspace_report()?,
            "" | "all" | "default" => {
                format!("{}\r\n{}", self.stats_report(), self.keyspace_report()?)
            }
            _ => String::new(),
        };
        self.counters.command(1);
        Ok(report)
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    /// Applies each command in order under a single write lock.
    ///
    /// Like a network pipeline, a failing command does not stop the ones
    /// after it; the first error is returned once all have run.
    #[tracing::instrument(level = "trace", skip_all)]
    async fn pipeline(&self, ops: Vec<RecordOp>) -> StorageResult<()> {
        self.counters.command(ops.len());
        let mut data = self.write_lock()?;
        let now = self.clock.now();

        let mut first_err = None;
        for op in ops {
            if let Err(err) = Self::apply_op(&mut data, op, now) {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Applies the commands atomically.
    ///
    /// The prior state of every touched key is saved before applying; if
    /// any command fails, the saved state is restored before returning.
    #[tracing::instrument(level = "trace", skip_all)]
    async fn transaction(&self, ops: Vec<RecordOp>) -> StorageResult<()> {
        self.counters.command(ops.len() + 2);
        let mut data = self.write_lock()?;
        let now = self.clock.now();

        let mut saved: HashMap<Bytes, Option<StoredValue>> = HashMap::new();
        for op in &ops {
            let key = match op {
                RecordOp::Put(put) => &put.record.key,
                RecordOp::Delete(key) => key,
                RecordOp::IndexAdd { index, .. } | RecordOp::IndexRemove { index, .. } => index,
            };
            saved
                .entry(key.clone())
                .or_insert_with(|| data.get(key).cloned());
        }

        for op in ops {
            if let Err(err) = Self::apply_op(&mut data, op, now) {
                for (key, prior) in saved {
                    match prior {
                        Some(stored) => data.insert(key, stored),
                        None => data.remove(&key),
                    };
                }
                return Err(err);
            }
        }
        Ok(())
    }

    async fn flush_all(&self) -> StorageResult<()> {
        self.counters.command(1);
        self.write_lock()?.clear();
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        // No-op for in-memory storage
        Ok(())
    }
}

/// Injected failure that fires either once or on every call.
#[cfg(feature = "test-utils")]
#[derive(Clone)]
enum Failure {
    /// Error is returned once, then automatically cleared.
    Once(StorageError),
    /// Error is returned on every subsequent call until explicitly cleared.
    Persistent(StorageError),
}

#[cfg(feature = "test-utils")]
type FailSlot = arc_swap::ArcSwap<Option<Failure>>;

/// Checks a [`FailSlot`] and returns an error if one is set.
///
/// For [`Failure::Once`], the slot is atomically swapped to `None` so the
/// error fires exactly once. For [`Failure::Persistent`], the slot is left
/// unchanged.
#[cfg(feature = "test-utils")]
fn check_failure(slot: &FailSlot) -> StorageResult<()> {
    let guard = slot.load();
    match guard.as_ref() {
        None => Ok(()),
        Some(Failure::Persistent(err)) => Err(err.clone()),
        Some(Failure::Once(_)) => {
            // if another thread raced us, only one of them gets the error
            let prev = slot.swap(Arc::new(None));
            match prev.as_ref() {
                Some(Failure::Once(err)) => Err(err.clone()),
                _ => Ok(()),
            }
        }
    }
}

/// A storage wrapper that delegates to an inner [`Storage`] but can inject
/// failures into `pipeline`, `transaction`, `range_by_lex` and `get_many`
/// on demand.
///
/// A failing call never reaches the inner storage, so it has no effect.
///
/// Gated behind the `test-utils` feature.
///
/// # Example
///
/// ```ignore
/// let inner = Arc::new(InMemoryStorage::new());
/// let storage = FailingStorage::wrap(inner);
/// storage.fail_transaction(StorageError::Storage("connection reset".into()));
/// // every transaction call now returns Err(...)
///
/// storage.fail_range_once(StorageError::Storage("timeout".into()));
/// // only the next range query returns Err(...), then auto-clears
/// ```
#[cfg(feature = "test-utils")]
pub struct FailingStorage {
    inner: Arc<dyn Storage>,
    fail_pipeline: FailSlot,
    fail_transaction: FailSlot,
    fail_range: FailSlot,
    fail_get_many: FailSlot,
}

#[cfg(feature = "test-utils")]
impl FailingStorage {
    /// Wraps an existing storage, with all failure injections initially `None`.
    pub fn wrap(inner: Arc<dyn Storage>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_pipeline: arc_swap::ArcSwap::from_pointee(None),
            fail_transaction: arc_swap::ArcSwap::from_pointee(None),
            fail_range: arc_swap::ArcSwap::from_pointee(None),
            fail_get_many: arc_swap::ArcSwap::from_pointee(None),
        })
    }

    /// Makes `pipeline` return the given error on every subsequent call.
    pub fn fail_pipeline(&self, err: StorageError) {
        self.fail_pipeline
            .store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `pipeline` return the given error on the next call only.
    pub fn fail_pipeline_once(&self, err: StorageError) {
        self.fail_pipeline.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Makes `transaction` return the given error on every subsequent call.
    pub fn fail_transaction(&self, err: StorageError) {
        self.fail_transaction
            .store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `transaction` return the given error on the next call only.
    pub fn fail_transaction_once(&self, err: StorageError) {
        self.fail_transaction
            .store(Arc::new(Some(Failure::Once(err))));
    }

    /// Makes `range_by_lex` return the given error on every subsequent call.
    pub fn fail_range(&self, err: StorageError) {
        self.fail_range
            .store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `range_by_lex` return the given error on the next call only.
    pub fn fail_range_once(&self, err: StorageError) {
        self.fail_range.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Makes `get_many` return the given error on every subsequent call.
    pub fn fail_get_many(&self, err: StorageError) {
        self.fail_get_many
            .store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `get_many` return the given error on the next call only.
    pub fn fail_get_many_once(&self, err: StorageError) {
        self.fail_get_many.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Clears every injected failure.
    pub fn clear(&self) {
        for slot in [
            &self.fail_pipeline,
            &self.fail_transaction,
            &self.fail_range,
            &self.fail_get_many,
        ] {
            slot.store(Arc::new(None));
        }
    }
}

#[cfg(feature = "test-utils")]
#[async_trait]
impl StorageRead for FailingStorage {
    async fn get(&self, key: Bytes) -> StorageResult<Option<Bytes>> {
        self.inner.get(key).await
    }

    async fn get_many(&self, keys: Vec<Bytes>) -> StorageResult<Vec<Option<Bytes>>> {
        check_failure(&self.fail_get_many)?;
        self.inner.get_many(keys).await
    }

    async fn range_by_lex(&self, index: Bytes, query: LexQuery) -> StorageResult<Vec<Bytes>> {
        check_failure(&self.fail_range)?;
        self.inner.range_by_lex(index, query).await
    }

    async fn info(&self, section: &str) -> StorageResult<String> {
        self.inner.info(section).await
    }
}

#[cfg(feature = "test-utils")]
#[async_trait]
impl Storage for FailingStorage {
    async fn pipeline(&self, ops: Vec<RecordOp>) -> StorageResult<()> {
        check_failure(&self.fail_pipeline)?;
        self.inner.pipeline(ops).await
    }

    async fn transaction(&self, ops: Vec<RecordOp>) -> StorageResult<()> {
        check_failure(&self.fail_transaction)?;
        self.inner.transaction(ops).await
    }

    async fn flush_all(&self) -> StorageResult<()> {
        self.inner.flush_all().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicI64;

    use super::*;
    use crate::storage::{PutOptions, Record};
    use crate::{LexBound, LexRange};

    struct ManualClock(AtomicI64);

    impl ManualClock {
        fn advance(&self, ms: i64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn put(key: &str, value: &str) -> RecordOp {
        RecordOp::Put(Record::new(b(key), b(value)).into())
    }

    fn put_ttl(key: &str, value: &str, ttl: Ttl) -> RecordOp {
        RecordOp::Put(PutRecordOp::new_with_options(
            Record::new(b(key), b(value)),
            PutOptions { ttl },
        ))
    }

    fn index_add(member: &str) -> RecordOp {
        RecordOp::IndexAdd {
            index: b("idx"),
            member: b(member),
        }
    }

    fn all(order: ScanOrder) -> LexQuery {
        LexQuery::new(LexRange::unbounded(), order, 0, usize::MAX)
    }

    #[tokio::test]
    async fn should_return_none_when_key_not_found() {
        // given
        let storage = InMemoryStorage::new();

        // when
        let result = storage.get(b("missing_key")).await;

        // then
        assert_eq!(result, Ok(None));
    }

    #[tokio::test]
    async fn should_store_and_retrieve_value() {
        // given
        let storage = InMemoryStorage::new();

        // when
        storage.pipeline(vec![put("test_key", "test_value")]).await.unwrap();
        let result = storage.get(b("test_key")).await.unwrap();

        // then
        assert_eq!(result, Some(b("test_value")));
    }

    #[tokio::test]
    async fn should_store_empty_value_distinct_from_absent() {
        // given
        let storage = InMemoryStorage::new();

        // when
        storage.pipeline(vec![put("k", "")]).await.unwrap();

        // then
        assert_eq!(storage.get(b("k")).await.unwrap(), Some(Bytes::new()));
    }

    #[tokio::test]
    async fn should_get_many_in_request_order_with_absent_slots() {
        // given
        let storage = InMemoryStorage::new();
        storage
            .pipeline(vec![put("a", "1"), put("c", "3")])
            .await
            .unwrap();

        // when
        let values = storage
            .get_many(vec![b("c"), b("b"), b("a")])
            .await
            .unwrap();

        // then
        assert_eq!(values, vec![Some(b("3")), None, Some(b("1"))]);
    }

    #[tokio::test]
    async fn should_page_index_members_in_both_orders() {
        // given
        let storage = InMemoryStorage::new();
        storage
            .pipeline(vec![
                index_add("d"),
                index_add("a"),
                index_add("c"),
                index_add("b"),
            ])
            .await
            .unwrap();
        let range = LexRange::new(LexBound::Inclusive(b("a")), LexBound::Exclusive(b("d")));

        // when
        let asc_first = storage
            .range_by_lex(b("idx"), LexQuery::new(range.clone(), ScanOrder::Ascending, 0, 2))
            .await
            .unwrap();
        let asc_second = storage
            .range_by_lex(b("idx"), LexQuery::new(range.clone(), ScanOrder::Ascending, 2, 2))
            .await
            .unwrap();
        let desc = storage
            .range_by_lex(b("idx"), LexQuery::new(range, ScanOrder::Descending, 0, 10))
            .await
            .unwrap();

        // then
        assert_eq!(asc_first, vec![b("a"), b("b")]);
        assert_eq!(asc_second, vec![b("c")]);
        assert_eq!(desc, vec![b("c"), b("b"), b("a")]);
    }

    #[tokio::test]
    async fn should_return_nothing_for_empty_window() {
        // given
        let storage = InMemoryStorage::new();
        storage.pipeline(vec![index_add("x")]).await.unwrap();
        let range = LexRange::from_keys(Some(b("x")), Some(b("x")));

        // when
        let members = storage
            .range_by_lex(b("idx"), LexQuery::new(range, ScanOrder::Ascending, 0, 10))
            .await
            .unwrap();

        // then
        assert!(members.is_empty());
    }

    #[tokio::test]
    async fn should_drop_index_key_when_last_member_removed() {
        // given
        let storage = InMemoryStorage::new();
        storage.pipeline(vec![index_add("a")]).await.unwrap();

        // when
        storage
            .pipeline(vec![RecordOp::IndexRemove {
                index: b("idx"),
                member: b("a"),
            }])
            .await
            .unwrap();

        // then
        let info = storage.info("keyspace").await.unwrap();
        assert_eq!(info, "# Keyspace\r\n");
        assert!(storage
            .range_by_lex(b("idx"), all(ScanOrder::Ascending))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn should_list_index_members_independently_of_values() {
        // given - "orphan" is indexed but holds no value
        let storage = InMemoryStorage::new();
        storage
            .pipeline(vec![put("a", "1"), index_add("a"), index_add("orphan")])
            .await
            .unwrap();

        // when
        let members = storage.index_members(b"idx").unwrap();

        // then
        assert_eq!(members, vec![b("a"), b("orphan")]);
        assert_eq!(storage.value_keys().unwrap(), vec![b("a")]);
        assert!(storage.index_members(b"missing").unwrap().is_empty());
        assert!(matches!(
            storage.index_members(b"a"),
            Err(StorageError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn should_reject_reading_index_as_value() {
        // given
        let storage = InMemoryStorage::new();
        storage.pipeline(vec![index_add("a")]).await.unwrap();

        // when
        let result = storage.get(b("idx")).await;

        // then
        assert!(matches!(result, Err(StorageError::Storage(msg)) if msg.starts_with("WRONGTYPE")));
    }

    #[tokio::test]
    async fn should_keep_applying_pipeline_after_failed_command() {
        // given
        let storage = InMemoryStorage::new();
        storage.pipeline(vec![put("idx", "plain")]).await.unwrap();

        // when
        let result = storage
            .pipeline(vec![index_add("a"), put("after", "1")])
            .await;

        // then
        assert!(result.is_err());
        assert_eq!(storage.get(b("after")).await.unwrap(), Some(b("1")));
    }

    #[tokio::test]
    async fn should_roll_back_transaction_on_failed_command() {
        // given
        let storage = InMemoryStorage::new();
        storage
            .pipeline(vec![put("idx", "plain"), put("b", "old")])
            .await
            .unwrap();

        // when
        let result = storage
            .transaction(vec![
                put("a", "1"),
                RecordOp::Delete(b("b")),
                index_add("a"),
            ])
            .await;

        // then
        assert!(result.is_err());
        assert_eq!(storage.get(b("a")).await.unwrap(), None);
        assert_eq!(storage.get(b("b")).await.unwrap(), Some(b("old")));
        assert_eq!(storage.get(b("idx")).await.unwrap(), Some(b("plain")));
    }

    #[tokio::test]
    async fn should_keep_existing_expiry_on_put_with_keep_ttl() {
        // given
        let clock = Arc::new(ManualClock(AtomicI64::new(1_000)));
        let storage = InMemoryStorage::new().with_clock(clock.clone());
        storage
            .pipeline(vec![put_ttl("k", "v1", Ttl::ExpireAfter(500))])
            .await
            .unwrap();

        // when
        clock.advance(100);
        storage.pipeline(vec![put("k", "v2")]).await.unwrap();

        // then
        assert_eq!(storage.ttl_ms(b"k").unwrap(), Some(400));
        assert_eq!(storage.get(b("k")).await.unwrap(), Some(b("v2")));
        clock.advance(400);
        assert_eq!(storage.get(b("k")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn should_clear_expiry_on_put_with_no_expiry() {
        // given
        let clock = Arc::new(ManualClock(AtomicI64::new(0)));
        let storage = InMemoryStorage::new().with_clock(clock.clone());
        storage.pipeline(vec![put("k", "v1")]).await.unwrap();
        assert!(storage.expire(b"k", 10).unwrap());

        // when
        storage
            .pipeline(vec![put_ttl("k", "v2", Ttl::NoExpiry)])
            .await
            .unwrap();

        // then
        clock.advance(1_000);
        assert_eq!(storage.get(b("k")).await.unwrap(), Some(b("v2")));
    }

    #[tokio::test]
    async fn should_not_revive_expiry_of_expired_key() {
        // given
        let clock = Arc::new(ManualClock(AtomicI64::new(0)));
        let storage = InMemoryStorage::new().with_clock(clock.clone());
        storage
            .pipeline(vec![put_ttl("k", "v1", Ttl::ExpireAfter(10))])
            .await
            .unwrap();
        clock.advance(10);

        // when
        storage.pipeline(vec![put("k", "v2")]).await.unwrap();

        // then
        assert_eq!(storage.ttl_ms(b"k").unwrap(), None);
        assert_eq!(storage.get(b("k")).await.unwrap(), Some(b("v2")));
    }

    #[tokio::test]
    async fn should_flush_all_keys() {
        // given
        let storage = InMemoryStorage::new();
        storage
            .pipeline(vec![put("a", "1"), index_add("a")])
            .await
            .unwrap();

        // when
        storage.flush_all().await.unwrap();

        // then
        assert!(storage.value_keys().unwrap().is_empty());
        assert!(storage
            .range_by_lex(b("idx"), all(ScanOrder::Descending))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn should_report_command_counters_in_stats_section() {
        // given
        let storage = InMemoryStorage::new();
        storage.pipeline(vec![put("a", "1")]).await.unwrap();
        storage.get(b("a")).await.unwrap();
        storage.get(b("b")).await.unwrap();

        // when
        let info = storage.info("stats").await.unwrap();

        // then
        assert!(info.starts_with("# Stats\r\n"));
        assert!(info.contains("total_commands_processed:3\r\n"));
        assert!(info.contains("keyspace_hits:1\r\n"));
        assert!(info.contains("keyspace_misses:1\r\n"));
    }

    #[cfg(feature = "test-utils")]
    #[tokio::test]
    async fn should_fail_transaction_once_without_touching_inner() {
        // given
        let inner: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let storage = FailingStorage::wrap(inner.clone());
        storage.fail_transaction_once(StorageError::Storage("connection reset".into()));

        // when
        let first = storage.transaction(vec![put("a", "1")]).await;
        let second = storage.transaction(vec![put("b", "2")]).await;

        // then
        assert_eq!(first, Err(StorageError::Storage("connection reset".into())));
        assert!(second.is_ok());
        assert_eq!(inner.get(b("a")).await.unwrap(), None);
        assert_eq!(inner.get(b("b")).await.unwrap(), Some(b("2")));
    }
}
