//! Storage backed by a Redis server.
//!
//! Plain values live in the string key space. Each index is a sorted set
//! whose members all carry score 0, so lexicographic range commands order
//! them by raw bytes.

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::MultiplexedConnection;
use redis::{AsyncConnectionConfig, Client, IntoConnectionInfo, Pipeline, Value};

use super::config::RedisStorageConfig;
use super::{RecordOp, Storage, StorageRead};
use crate::{LexQuery, ScanOrder, StorageError, StorageResult, Ttl};

/// Storage over a multiplexed async Redis connection.
///
/// The connection is cheap to clone; every command clones it so that
/// concurrent callers share one socket.
pub struct RedisStorage {
    conn: MultiplexedConnection,
}

impl RedisStorage {
    /// Connects to the server described by `config`.
    pub async fn connect(config: &RedisStorageConfig) -> StorageResult<Self> {
        let mut info = format!("redis://{}", config.address)
            .into_connection_info()
            .map_err(|e| {
                StorageError::Storage(format!("Invalid Redis address {}: {}", config.address, e))
            })?;
        info.redis.password = config.password.clone();
        info.redis.db = config.database;

        let client = Client::open(info).map_err(StorageError::from_storage)?;
        let conn = client
            .get_multiplexed_async_connection_with_config(&connection_config(config))
            .await
            .map_err(|e| {
                StorageError::Storage(format!(
                    "Failed to connect to Redis at {}: {}",
                    config.address, e
                ))
            })?;
        tracing::debug!(address = %config.address, database = config.database, "connected to redis");
        Ok(Self { conn })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    async fn exec(&self, pipe: &Pipeline) -> StorageResult<()> {
        let mut conn = self.conn();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(StorageError::from_storage)?;
        Ok(())
    }
}

fn connection_config(config: &RedisStorageConfig) -> AsyncConnectionConfig {
    AsyncConnectionConfig::new()
        .set_connection_timeout(config.connect_timeout())
        .set_response_timeout(config.response_timeout())
}

/// Appends one command per op to `pipe`, discarding every reply.
fn push_ops(pipe: &mut Pipeline, ops: &[RecordOp]) {
    for op in ops {
        match op {
            RecordOp::Put(put) => {
                pipe.cmd("SET")
                    .arg(&put.record.key[..])
                    .arg(&put.record.value[..]);
                match put.options.ttl {
                    Ttl::Keep => {
                        pipe.arg("KEEPTTL");
                    }
                    Ttl::NoExpiry => {}
                    Ttl::ExpireAfter(ms) => {
                        pipe.arg("PX").arg(ms);
                    }
                }
            }
            RecordOp::Delete(key) => {
                pipe.cmd("DEL").arg(&key[..]);
            }
            RecordOp::IndexAdd { index, member } => {
                pipe.cmd("ZADD").arg(&index[..]).arg(0).arg(&member[..]);
            }
            RecordOp::IndexRemove { index, member } => {
                pipe.cmd("ZREM").arg(&index[..]).arg(&member[..]);
            }
        }
        pipe.ignore();
    }
}

/// Decodes one slot of a bulk lookup reply.
///
/// A slot is either a string payload or nil; anything else is a protocol
/// violation.
fn decode_value(reply: Value) -> StorageResult<Option<Bytes>> {
    match reply {
        Value::Nil => Ok(None),
        Value::BulkString(data) => Ok(Some(Bytes::from(data))),
        Value::SimpleString(s) => Ok(Some(Bytes::from(s))),
        other => Err(StorageError::Storage(format!(
            "Unexpected reply in bulk lookup: {:?}",
            other
        ))),
    }
}

/// Builds the arguments of a lexicographic range query after the index key.
///
/// Descending queries take the window as `max min`.
fn range_args(query: &LexQuery) -> (&'static str, [Bytes; 2], i64, i64) {
    let min = query.range.min.encode();
    let max = query.range.max.encode();
    let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);
    // a negative count asks for every remaining member
    let count = i64::try_from(query.count).unwrap_or(-1);
    match query.order {
        ScanOrder::Ascending => ("ZRANGEBYLEX", [min, max], offset, count),
        ScanOrder::Descending => ("ZREVRANGEBYLEX", [max, min], offset, count),
    }
}

#[async_trait]
impl StorageRead for RedisStorage {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: Bytes) -> StorageResult<Option<Bytes>> {
        let mut conn = self.conn();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(&key[..])
            .query_async(&mut conn)
            .await
            .map_err(StorageError::from_storage)?;
        Ok(value.map(Bytes::from))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn get_many(&self, keys: Vec<Bytes>) -> StorageResult<Vec<Option<Bytes>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = redis::cmd("MGET");
        for key in &keys {
            cmd.arg(&key[..]);
        }
        let mut conn = self.conn();
        let replies: Vec<Value> = cmd
            .query_async(&mut conn)
            .await
            .map_err(StorageError::from_storage)?;
        if replies.len() != keys.len() {
            return Err(StorageError::Storage(format!(
                "Bulk lookup returned {} values for {} keys",
                replies.len(),
                keys.len()
            )));
        }
        replies.into_iter().map(decode_value).collect()
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn range_by_lex(&self, index: Bytes, query: LexQuery) -> StorageResult<Vec<Bytes>> {
        if query.range.is_empty() || query.count == 0 {
            return Ok(Vec::new());
        }
        let (name, [first, second], offset, count) = range_args(&query);
        let mut conn = self.conn();
        let members: Vec<Vec<u8>> = redis::cmd(name)
            .arg(&index[..])
            .arg(&first[..])
            .arg(&second[..])
            .arg("LIMIT")
            .arg(offset)
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(StorageError::from_storage)?;
        Ok(members.into_iter().map(Bytes::from).collect())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn info(&self, section: &str) -> StorageResult<String> {
        let mut conn = self.conn();
        redis::cmd("INFO")
            .arg(section)
            .query_async(&mut conn)
            .await
            .map_err(StorageError::from_storage)
    }
}

#[async_trait]
impl Storage for RedisStorage {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn pipeline(&self, ops: Vec<RecordOp>) -> StorageResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        push_ops(&mut pipe, &ops);
        self.exec(&pipe).await
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn transaction(&self, ops: Vec<RecordOp>) -> StorageResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        push_ops(&mut pipe, &ops);
        self.exec(&pipe).await
    }

    async fn flush_all(&self) -> StorageResult<()> {
        let mut conn = self.conn();
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(StorageError::from_storage)?;
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        // the multiplexed connection shuts down once its last clone is dropped
        tracing::debug!("closing redis storage");
        Ok(())
    }
}
