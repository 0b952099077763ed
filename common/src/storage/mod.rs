pub mod config;
pub mod factory;
pub mod in_memory;
pub mod redis;

use async_trait::async_trait;
use bytes::Bytes;

use crate::LexQuery;

/// Expiry handling for a put.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum Ttl {
    /// Keeps whatever expiry the key already carries.
    #[default]
    Keep,
    NoExpiry,
    /// Expires the key after the given number of milliseconds.
    ExpireAfter(u64),
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct PutOptions {
    pub ttl: Ttl,
}

/// Encapsulates a record being put along with options specific to the put.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutRecordOp {
    pub record: Record,
    pub options: PutOptions,
}

impl PutRecordOp {
    pub fn new(record: Record) -> Self {
        Self {
            record,
            options: PutOptions::default(),
        }
    }

    pub fn new_with_options(record: Record, options: PutOptions) -> Self {
        Self { record, options }
    }
}

/// Converts a Record to a PutRecordOp with default options
impl From<Record> for PutRecordOp {
    fn from(record: Record) -> Self {
        Self::new(record)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub key: Bytes,
    pub value: Bytes,
}

impl Record {
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// A single mutating command sent to the store.
///
/// Index operations address a sorted set whose members all share the same
/// score, so members are ordered by their raw bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordOp {
    Put(PutRecordOp),
    Delete(Bytes),
    IndexAdd { index: Bytes, member: Bytes },
    IndexRemove { index: Bytes, member: Bytes },
}

/// Error type for storage operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Storage-related errors
    Storage(String),
    /// Internal errors
    Internal(String),
}

impl std::error::Error for StorageError {}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            StorageError::Storage(msg) => write!(f, "Storage error: {}", msg),
            StorageError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StorageError {
    /// Converts a storage error to StorageError::Storage.
    pub fn from_storage(e: impl std::fmt::Display) -> Self {
        StorageError::Storage(e.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Read commands supported by the backing store.
///
/// Every method is a single request/response round trip.
#[async_trait]
pub trait StorageRead: Send + Sync {
    /// Returns the value stored at `key`, or `None` if the key is absent.
    async fn get(&self, key: Bytes) -> StorageResult<Option<Bytes>>;

    /// Looks up many keys at once.
    ///
    /// The result has one slot per requested key, in request order. Absent
    /// keys yield `None`.
    async fn get_many(&self, keys: Vec<Bytes>) -> StorageResult<Vec<Option<Bytes>>>;

    /// Returns one page of members of the sorted set `index` that fall
    /// inside the query window, in the requested order.
    async fn range_by_lex(&self, index: Bytes, query: LexQuery) -> StorageResult<Vec<Bytes>>;

    /// Returns the textual statistics report for the given section.
    async fn info(&self, section: &str) -> StorageResult<String>;
}

/// The storage type encapsulates access to the backing store.
#[async_trait]
pub trait Storage: StorageRead {
    /// Sends a group of commands in one round trip.
    ///
    /// The commands are applied in order. A failure of any of them is
    /// reported as a single error.
    async fn pipeline(&self, ops: Vec<RecordOp>) -> StorageResult<()>;

    /// Applies a group of commands as one atomic transaction.
    ///
    /// Either every command takes effect or none is visible.
    async fn transaction(&self, ops: Vec<RecordOp>) -> StorageResult<()>;

    /// Removes every key from the current database.
    async fn flush_all(&self) -> StorageResult<()>;

    /// Closes the storage, releasing any resources.
    async fn close(&self) -> StorageResult<()>;
}
