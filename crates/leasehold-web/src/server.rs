//! Server setup with Tower middleware

use std::sync::Arc;
use std::time::Duration;

use leasehold_core::idempotency::{IdempotencyStore, InMemoryIdempotencyStore};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{AppState, Error, ServerConfig, create_router};

/// Run the axum server with the in-memory idempotency store.
///
/// # Errors
///
/// Returns an error if the router cannot be built or the listener fails.
pub async fn run_server(config: ServerConfig) -> Result<(), Error> {
    let store = Arc::new(InMemoryIdempotencyStore::new());
    let purge = spawn_purge_task(
        store.clone(),
        config.purge_interval,
        config.idempotency.record_ttl,
    );

    let app = create_router(&config, store, AppState::new())?;

    let listener = TcpListener::bind(&config.bind_address).await?;
    info!("Leasehold server listening on {}", config.bind_address);

    let served = axum::serve(listener, app).await;
    purge.abort();
    served?;

    Ok(())
}

/// Spawn a task removing records older than `ttl` every `interval`.
///
/// A zero interval is raised to one millisecond.
pub fn spawn_purge_task(
    store: Arc<dyn IdempotencyStore>,
    interval: Duration,
    ttl: Duration,
) -> JoinHandle<()> {
    let interval = interval.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_expired(ttl).await {
                Ok(0) => debug!("No expired idempotency records"),
                Ok(purged) => info!(purged, "Purged expired idempotency records"),
                Err(e) => warn!(error = %e, "Failed to purge idempotency records"),
            }
        }
    })
}
