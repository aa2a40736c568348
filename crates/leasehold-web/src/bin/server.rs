//! Leasehold Web Server Binary
//!
//! Runs the demo API behind the idempotency layer. Configuration comes from
//! `LEASEHOLD_*` environment variables, with the idempotency section
//! optionally loaded from the TOML or JSON file named by `LEASEHOLD_CONFIG`.

use std::path::PathBuf;

use anyhow::Context;
use leasehold_core::{IdempotencyConfig, ResultExt};
use leasehold_web::ServerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,leasehold_web=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ServerConfig::from_env();
    if let Some(path) = std::env::var_os("LEASEHOLD_CONFIG").map(PathBuf::from) {
        tracing::info!("Loading idempotency config from {}", path.display());
        config.idempotency = IdempotencyConfig::from_file(&path)
            .or_default_logged(config.idempotency.clone());
    }

    tracing::info!("Starting Leasehold server on {}", config.bind_address);
    tracing::info!(
        key_header = %config.idempotency.key_header,
        webhook_prefix = %config.idempotency.webhook_prefix,
        "Idempotency layer enabled"
    );

    leasehold_web::server::run_server(config)
        .await
        .context("Leasehold server failed")?;

    Ok(())
}
