//! HTTP server - JSON API over the vault

mod routes;

pub use routes::{create_router, VaultState};

use std::sync::Arc;

use tracing::{error, info};

use crate::runtime::Shutdown;
use crate::vault::Vault;

/// Bind `addr` and serve until `shutdown` fires. Runs an expiry watcher for
/// the lifetime of the server. If serving ends on its own, `shutdown` is
/// triggered so other subscribers stop with it.
pub async fn serve(vault: Arc<Vault>, addr: &str, app_name: &str, shutdown: Shutdown) -> std::io::Result<()> {
    let mut shutdown_rx = shutdown.subscribe();
    let watcher = vault.spawn_expiry_watcher(shutdown.subscribe());
    let router = create_router(vault, app_name);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("{} listening on http://{}", app_name, addr);

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, stopping server...");
        })
        .await;

    if !shutdown.is_triggered().await {
        if let Err(e) = &served {
            error!(error = %e, "server stopped without a shutdown signal");
        }
        shutdown.trigger().await;
    }
    watcher.stop();
    served
}
