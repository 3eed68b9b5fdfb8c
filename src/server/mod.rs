//! HTTP surface: device listing and import triggering.

mod routes;

pub use routes::{router, ApiState, API_PREFIX, ROUTES};

use crate::context::AppContext;
use crate::error::CliResult;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serve the API on `addr` until `shutdown` is cancelled.
///
/// Background imports still running at shutdown are cancelled and keep
/// whatever they already stored.
pub async fn serve(
    context: &AppContext,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> CliResult<()> {
    let state = ApiState {
        repository: context.repository.clone(),
        pipeline: context.pipeline.clone(),
        shutdown: shutdown.clone(),
    };
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!(address = %local, "listening");
    for (method, path) in ROUTES {
        info!("  {:<5} http://{}{}{}", method, local, API_PREFIX, path);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("server stopped");
    Ok(())
}
