//! HTTP server of the gateway.
//!
//! - [`api`]: Response types, route handlers and router construction

pub mod api;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

pub use api::{build_router, AppState};

/// Serve the API on `listener` until the state's shutdown token is cancelled.
///
/// In-flight streams end at cancellation, so graceful shutdown does not wait
/// on open generations.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    let shutdown = state.shutdown.clone();
    let app = build_router(state);

    info!("Listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Server shut down");
    Ok(())
}
