//! mailroom-relay binary entry point.
//!
//! Loads configuration, initializes logging, and prepares the identity
//! store. The provider transport adapter is supplied by the host
//! deployment; this binary validates everything up to that seam.
//!
//! Usage:
//! ```bash
//! mailroom-relay --config mailroom.toml
//! ```

use anyhow::Context;
use mailroom_relay::config::Config;
use mailroom_relay::store::SqliteStore;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = get_config_path();
    let config = Config::from_file(&config_path)
        .with_context(|| format!("loading configuration from {:?}", config_path))?;

    tracing::info!(
        "mailroom-relay v{} (group {}, operator {})",
        env!("CARGO_PKG_VERSION"),
        config.provider.group_id,
        config.provider.operator_id
    );

    let _store = SqliteStore::new(&config.storage.database)
        .await
        .with_context(|| format!("opening identity store at {:?}", config.storage.database))?;

    tracing::info!(
        "Identity store ready at {:?}; wire a provider transport to start relaying",
        config.storage.database
    );
    Ok(())
}

fn get_config_path() -> PathBuf {
    std::env::args()
        .skip_while(|arg| arg != "--config")
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("mailroom.toml"))
}
