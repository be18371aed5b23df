//! # Signoff - QuestGate verification code service
//!
//! Issues short one-time codes that facilitators hand to participants to
//! sign off a quest level, and redeems them exactly once.
//!
//! ## Architecture
//! ```text
//! Platform backend → Signoff → CodeManager → CodeStore
//!                                               ↓
//!                                         Redis (State)
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod codes;
mod config;
mod routes;
mod state;
mod store;

use crate::config::{AppConfig, StoreBackend};
use crate::state::AppState;

/// QuestGate Signoff - verification code service
#[derive(Parser, Debug)]
#[command(name = "signoff")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/signoff.toml")]
    config: String,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Code store backend (overrides config)
    #[arg(long, value_enum, env = "SIGNOFF_STORE")]
    store: Option<StoreBackend>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up .env before clap reads env-backed flags
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting QuestGate Signoff v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load(&args.config, &args)?;
    info!(
        store = ?config.store,
        code_ttl_secs = config.codes.ttl_secs,
        "Configuration loaded from {}",
        args.config
    );

    // Initialize application state
    let state = AppState::new(config.clone()).await?;
    if config.store == StoreBackend::Redis {
        info!("Redis connected: {}", config.redis_url);
    }

    // Build router
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Signoff listening on {}", config.listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Signoff shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to install JSON log subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
            .context("Failed to install log subscriber")?;
    }

    Ok(())
}
