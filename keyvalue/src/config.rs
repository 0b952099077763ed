//! Configuration options for KeyValue operations.

use common::StorageConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for opening a [`KeyValueDb`](crate::KeyValueDb) or
/// [`KeyValueDbReader`](crate::KeyValueDbReader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Maximum number of keys an iterator fetches from the index per
    /// request. Also the capacity of the iterator's prefetch buffer.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// How an iterator resumes after each page.
    #[serde(default)]
    pub pagination: Pagination,

    /// Key of the sorted set that orders every live key.
    ///
    /// This key is reserved: reads and writes addressing it are rejected.
    #[serde(default = "default_index_key")]
    pub index_key: String,
}

impl Config {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::InvalidInput("page_size must be positive".to_string()));
        }
        if self.index_key.is_empty() {
            return Err(Error::InvalidInput("index_key must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            page_size: default_page_size(),
            pagination: Pagination::default(),
            index_key: default_index_key(),
        }
    }
}

/// Resumption strategy between index pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pagination {
    /// Each page starts strictly after the last key of the previous page.
    ///
    /// Keys inserted or removed elsewhere in the index during a scan do not
    /// shift the pages that follow.
    #[default]
    KeyCursor,
    /// Each page starts at a numeric position within the original window.
    ///
    /// Only exact while the index is not mutated during the scan.
    Offset,
}

fn default_page_size() -> usize {
    10_000
}

fn default_index_key() -> String {
    "__index__".to_string()
}
