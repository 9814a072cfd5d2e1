//! Serving with a bounded graceful drain.

use anyhow::Context;
use axum::Router;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Serve `app` until `signal` resolves, then stop accepting connections and
/// let in-flight requests finish.
///
/// `work` is cancelled only if the drain outlasts `drain_timeout`, which
/// makes any resolution still running give up.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    work: CancellationToken,
    signal: impl Future<Output = ()> + Send + 'static,
    drain_timeout: Duration,
) -> anyhow::Result<()> {
    let stopping = CancellationToken::new();
    let stop = stopping.clone();

    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                signal.await;
                info!("Shutting down server gracefully...");
                stop.cancel();
            })
            .await
    };

    let drain_deadline = async {
        stopping.cancelled().await;
        tokio::time::sleep(drain_timeout).await;
    };

    tokio::select! {
        result = server => result.context("Server error")?,
        _ = drain_deadline => {
            warn!(timeout_secs = drain_timeout.as_secs(), "Graceful shutdown timed out");
            work.cancel();
        }
    }
    Ok(())
}
