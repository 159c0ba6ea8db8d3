//! Server startup and lifecycle

use crate::listener::{self, ListenAddr, ListenerHandle, TrackingListener};
use crate::{routes, AppState, GatewayConfig};
use anyhow::Context;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

/// Run the gateway server until it has been told to drain and every
/// connection it accepted has closed
pub async fn run_server(config: GatewayConfig) -> anyhow::Result<()> {
    config.validate()?;

    let addr: ListenAddr = config
        .listen
        .parse()
        .with_context(|| format!("listen address {}", config.listen))?;
    let listener = listener::listen(&addr).await?;

    info!(pid = std::process::id(), listen = %addr, "Harbour gateway listening");
    info!(base_url = %listener.base_url(), "LFS API ready for requests");

    let drain_timeout = config.drain_timeout();
    let state = Arc::new(AppState::new(config)?);
    let app = routes::create_router(state);

    tokio::spawn(shutdown_signal(listener.handle()));

    serve(listener, app, drain_timeout).await
}

/// Serve `app` on `listener` and drain once the listener stops accepting
///
/// Returns after every tracked connection has closed, or once
/// `drain_timeout` expires with the remaining connections abandoned.
pub async fn serve(
    listener: TrackingListener,
    app: Router,
    drain_timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let handle = listener.handle();
    let stopped = handle.stopped();

    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(stopped)
            .await
    });

    tokio::select! {
        result = &mut server => {
            // Only an accept-loop failure ends the server without a drain signal
            result??;
            return Ok(());
        }
        () = handle.stopped() => {}
    }

    let remaining = match drain_timeout {
        Some(timeout) => handle.drain_with_timeout(timeout).await,
        None => {
            handle.drain().await;
            0
        }
    };

    if remaining > 0 {
        warn!(remaining, "drain timeout expired, abandoning open connections");
        server.abort();
        return Ok(());
    }

    server.await??;
    info!("drain complete, all connections closed");

    Ok(())
}

/// Wait for SIGHUP or Ctrl-C, then stop accepting connections
pub async fn shutdown_signal(handle: ListenerHandle) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(err) => {
                error!("failed to install Ctrl+C handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let hangup = async {
        match signal::unix::signal(signal::unix::SignalKind::hangup()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGHUP handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let hangup = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT, draining connections");
        }
        _ = hangup => {
            info!("received SIGHUP, draining connections");
        }
    }

    handle.stop_accepting();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    fn app() -> Router {
        Router::new().route("/", get(|| async { "ok" }))
    }

    #[tokio::test]
    async fn test_serve_returns_after_stop() {
        let listener = listener::listen(&"127.0.0.1:0".parse().unwrap()).await.unwrap();
        let handle = listener.handle();
        let server = tokio::spawn(serve(listener, app(), None));

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop_accepting();

        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("server should return once idle")
            .unwrap()
            .unwrap();
        assert_eq!(handle.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_serve_abandons_connections_after_timeout() {
        use tokio::io::AsyncWriteExt;

        let started = Arc::new(tokio::sync::Notify::new());
        let slow = Router::new().route(
            "/slow",
            get({
                let started = Arc::clone(&started);
                move || async move {
                    started.notify_one();
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    "late"
                }
            }),
        );

        let listener = listener::listen(&"127.0.0.1:0".parse().unwrap()).await.unwrap();
        let handle = listener.handle();
        let addr = listener.bound_addr();
        let server = tokio::spawn(serve(listener, slow, Some(Duration::from_millis(100))));

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /slow HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        started.notified().await;

        handle.stop_accepting();

        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("server should give up after the drain timeout")
            .unwrap()
            .unwrap();
    }
}
