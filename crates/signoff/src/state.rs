//! Application state and shared resources.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;

use crate::codes::{CodeManager, CodePolicy};
use crate::config::{AppConfig, StoreBackend};
use crate::store::{CodeStore, MemoryCodeStore, RedisCodeStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Verification code manager
    pub codes: Arc<CodeManager>,

    /// Process start, for uptime reporting
    pub started: Instant,
}

impl AppState {
    /// Create new application state, connecting to the configured store
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store: Arc<dyn CodeStore> = match config.store {
            StoreBackend::Redis => Arc::new(
                RedisCodeStore::connect(&config.redis_url)
                    .await
                    .context("Failed to connect to Redis")?,
            ),
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory code store; codes are lost on restart");
                Arc::new(MemoryCodeStore::new())
            }
        };

        Ok(Self::with_store(config, store))
    }

    /// State over an existing store
    pub fn with_store(config: AppConfig, store: Arc<dyn CodeStore>) -> Self {
        let policy = CodePolicy::from(&config.codes);

        Self {
            codes: Arc::new(CodeManager::new(store, policy)),
            config,
            started: Instant::now(),
        }
    }
}
