use axum::Router;
use tokio::net::{TcpListener, ToSocketAddrs};

use crate::jobs::ShutdownOutcome;
use crate::lifecycle::{shutdown_signal, Lifecycle, LifecycleError};

/// Serve `router` until ctrl-c or SIGTERM, then shut `lifecycle` down.
///
/// On the signal the server stops accepting connections and lets in-flight
/// requests finish. The lifecycle then drains tracked work and stops the
/// dispatcher, so requests still running can submit their jobs.
pub async fn serve<A, J>(
    addr: A,
    router: Router,
    lifecycle: Lifecycle<J>,
) -> Result<ShutdownOutcome, LifecycleError>
where
    A: ToSocketAddrs,
    J: Send + 'static,
{
    let listener = TcpListener::bind(addr).await.map_err(LifecycleError::Serve)?;
    if let Ok(local) = listener.local_addr() {
        tracing::info!("➜  Listening on http://{}", local);
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(graceful())
        .await
        .map_err(LifecycleError::Serve)?;

    tracing::info!("server stopped accepting requests");
    Ok(lifecycle.shutdown().await)
}

async fn graceful() {
    match shutdown_signal().await {
        Ok(()) => tracing::info!("termination signal received"),
        Err(e) => {
            // Without a signal handler the server can only be stopped externally.
            tracing::error!(error = %e, "shutdown signal unavailable");
            std::future::pending::<()>().await
        }
    }
}
