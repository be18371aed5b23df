//! Configuration management for Signoff.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;

use questgate_common::constants::{
    DEFAULT_CODE_TTL_SECS, DEFAULT_LISTEN_ADDR, DEFAULT_MAX_ISSUE_ATTEMPTS, DEFAULT_REDIS_URL,
    DEFAULT_RETENTION_SECS,
};

use crate::codes::CodePolicy;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Where verification codes are kept
    #[serde(default)]
    pub store: StoreBackend,

    /// Verification code configuration
    #[serde(default)]
    pub codes: CodesConfig,
}

/// Backing store selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Shared Redis instance
    #[default]
    Redis,
    /// Process memory; single instance, lost on restart
    Memory,
}

/// Verification code configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CodesConfig {
    /// Validity window in seconds
    #[serde(default = "default_code_ttl")]
    pub ttl_secs: u64,

    /// How long consumed/expired codes are remembered after the window
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    /// Fresh codes to try on collision before giving up
    #[serde(default = "default_max_issue_attempts")]
    pub max_issue_attempts: u32,
}

impl Default for CodesConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_code_ttl(),
            retention_secs: default_retention(),
            max_issue_attempts: default_max_issue_attempts(),
        }
    }
}

impl From<&CodesConfig> for CodePolicy {
    fn from(config: &CodesConfig) -> Self {
        Self {
            ttl_secs: config.ttl_secs,
            retention_secs: config.retention_secs,
            max_issue_attempts: config.max_issue_attempts,
        }
    }
}

// Default value functions
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_code_ttl() -> u64 { DEFAULT_CODE_TTL_SECS } // 1 hour
fn default_retention() -> u64 { DEFAULT_RETENTION_SECS } // 24 hours
fn default_max_issue_attempts() -> u32 { DEFAULT_MAX_ISSUE_ATTEMPTS }

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            Self::from_file(config_path)?
        } else {
            // Use defaults if config file doesn't exist
            tracing::warn!("Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = redis_url.clone();
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(store) = args.store {
            config.store = store;
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(config_path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path))
            .add_source(config::Environment::with_prefix("SIGNOFF").separator("__"))
            .build()
            .context("Failed to load config file")?;

        settings
            .try_deserialize()
            .context("Failed to parse config")
    }

    /// Reject settings that would make every code unusable
    pub fn validate(&self) -> Result<()> {
        if self.codes.ttl_secs == 0 {
            bail!("codes.ttl_secs must be greater than zero");
        }
        if self.codes.max_issue_attempts == 0 {
            bail!("codes.max_issue_attempts must be greater than zero");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            listen_addr: default_listen_addr(),
            store: StoreBackend::default(),
            codes: CodesConfig::default(),
        }
    }
}
