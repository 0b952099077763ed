pub mod bytes;
pub mod storage;

pub use bytes::{BytesRange, LexBound, LexQuery, LexRange, ScanOrder};
pub use storage::config::{RedisStorageConfig, StorageConfig};
pub use storage::{
    PutOptions, PutRecordOp, Record, RecordOp, Storage, StorageError, StorageRead, StorageResult,
    Ttl,
};
