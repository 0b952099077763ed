//! Redis KeyValue - an ordered key-value store over a Redis-compatible server.
//!
//! The server offers an unordered key space plus sorted sets. This crate
//! turns that into an ordered store: every value lives at its own key, and a
//! single sorted set (the *index*) holds every live key with score 0 so that
//! lexicographic range queries return keys in byte order.
//!
//! # Architecture
//!
//! Writes update the value and the index together. Single writes are
//! pipelined in one round trip; a [`WriteBatch`] applies all of its writes
//! in one atomic transaction.
//!
//! Iterators page through the index in the background. Each page of keys is
//! resolved with one bulk lookup and buffered, so the consumer sees one pair
//! at a time while the next page is already being fetched.
//!
//! # Key Concepts
//!
//! - **KeyValueDb**: The main entry point providing both read and write operations.
//! - **KeyValueDbReader**: A read-only view of the store, useful for consumers
//!   that should not have write access.
//! - **KeyValueRead**: Trait defining read operations shared by both types.
//! - **WriteBatch**: A single-use group of writes applied atomically.
//! - **KeyValueIterator**: A cursor over a half-open key range.
//!
//! # Example
//!
//! ```ignore
//! use redis_keyvalue::{KeyValueDb, KeyValueRead, Config};
//! use bytes::Bytes;
//!
//! let kv = KeyValueDb::open(config).await?;
//!
//! kv.set(Bytes::from("user:123"), Bytes::from("alice")).await?;
//! kv.set(Bytes::from("user:456"), Bytes::from("bob")).await?;
//!
//! let mut iter = kv.iterator(Some(Bytes::from("user:")), Some(Bytes::from("user;"))).await?;
//! while iter.valid() {
//!     println!("{:?}: {:?}", iter.key(), iter.value());
//!     iter.next().await;
//! }
//! iter.close().await?;
//!
//! kv.delete(Bytes::from("user:123")).await?;
//! ```

mod batch;
mod config;
mod error;
mod iterator;
mod keyvalue;
mod model;
mod reader;
mod stats;
mod storage;

pub use batch::WriteBatch;
pub use config::{Config, Pagination};
pub use error::{Error, Result};
pub use iterator::KeyValueIterator;
pub use keyvalue::KeyValueDb;
pub use model::KeyValueEntry;
pub use reader::{KeyValueDbReader, KeyValueRead};

pub use common::{RedisStorageConfig, StorageConfig};
