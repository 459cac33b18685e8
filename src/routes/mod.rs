//! Optional HTTP monitor.  Only started when `MONITOR_BIND_ADDR` is set.

pub mod monitor;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::shutdown::ShutdownSignal;
use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health",        get(monitor::health))
        .route("/api/monitor/stats", get(monitor::get_stats))
        .route("/api/monitor/risk",  get(monitor::get_risk))
        .route("/ws/monitor",        get(monitor::ws_monitor))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the monitor until the shutdown signal is raised.
pub async fn serve(addr: SocketAddr, state: SharedState, shutdown: ShutdownSignal) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "🖥️ Monitor listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.wait(Duration::from_millis(200)).await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::state::build_state;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn health_answers_over_http() {
        let (state, _risk_tx) = build_state(&test_config().queues);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = ShutdownSignal::new();
        let stop = shutdown.clone();
        let server = tokio::spawn(async move {
            axum::serve(listener, router(state))
                .with_graceful_shutdown(async move { stop.wait(Duration::from_millis(20)).await })
                .await
        });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /api/health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(r#""service":"flashea-brain""#));

        shutdown.trigger();
        server.await.unwrap().unwrap();
    }
}
