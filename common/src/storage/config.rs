//! Storage backend configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Selects and configures the backing store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageConfig {
    /// Process-local storage, useful for tests and embedding.
    #[default]
    InMemory,
    /// A Redis server reached over TCP.
    Redis(RedisStorageConfig),
}

/// Connection settings for a Redis backing store.
///
/// These are consumed once when the storage is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisStorageConfig {
    /// `host:port` of the server.
    #[serde(default = "default_address")]
    pub address: String,
    /// Password for `AUTH`; `None` when the server has none set.
    #[serde(default)]
    pub password: Option<String>,
    /// Logical database index.
    #[serde(default)]
    pub database: i64,
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl RedisStorageConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl Default for RedisStorageConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            password: None,
            database: 0,
            connect_timeout_ms: default_timeout_ms(),
            response_timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_address() -> String {
    "localhost:6379".to_string()
}

fn default_timeout_ms() -> u64 {
    60_000
}
