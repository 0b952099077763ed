//! Storage factory for creating storage instances from configuration.
//!
//! This module provides factory functions and builders for creating storage backends
//! based on configuration, supporting both InMemory and Redis backends.

use std::sync::Arc;

use super::config::StorageConfig;
use super::in_memory::{Clock, InMemoryStorage};
use super::redis::RedisStorage;
use super::{Storage, StorageRead, StorageResult};

/// Creates a storage instance based on the provided configuration.
///
/// This is a convenience function that uses default options. For more control,
/// use [`StorageBuilder`].
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    StorageBuilder::new(config.clone()).build().await
}

/// Creates a read-only storage handle based on the provided configuration.
pub async fn create_storage_read(config: &StorageConfig) -> StorageResult<Arc<dyn StorageRead>> {
    let storage = create_storage(config).await?;
    Ok(storage as Arc<dyn StorageRead>)
}

/// Builder for creating storage instances with custom options.
///
/// This builder provides a fluent API for configuring storage, including
/// runtime options that cannot be serialized in configuration files.
///
/// # Example
///
/// ```rust,ignore
/// use common::storage::factory::StorageBuilder;
/// use common::storage::config::StorageConfig;
///
/// let storage = StorageBuilder::new(StorageConfig::InMemory)
///     .with_clock(clock)
///     .build()
///     .await?;
/// ```
pub struct StorageBuilder {
    config: StorageConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl StorageBuilder {
    /// Creates a new storage builder with the given configuration.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            clock: None,
        }
    }

    /// Sets the clock used for expiry checks.
    ///
    /// This option only affects in-memory storage; a server keeps its own time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the storage instance.
    pub async fn build(self) -> StorageResult<Arc<dyn Storage>> {
        match &self.config {
            StorageConfig::InMemory => {
                let storage = match self.clock {
                    Some(clock) => InMemoryStorage::new().with_clock(clock),
                    None => InMemoryStorage::new(),
                };
                Ok(Arc::new(storage))
            }
            StorageConfig::Redis(redis_config) => {
                let storage = RedisStorage::connect(redis_config).await?;
                Ok(Arc::new(storage))
            }
        }
    }
}
