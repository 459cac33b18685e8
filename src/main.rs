//! # FlashEA Brain — tick ingestion, feedback-driven risk and policy hub
//!
//! ## Architecture Overview
//!
//! ```text
//!  ┌──────────┐  SUB :7777   ┌───────────┐  ingestion_queue  ┌──────────────────┐  PUB :7778  ┌──────────┐
//!  │  Feeder  │ ────────────▶│ Ingestion │ ─────────────────▶│                  │ ───────────▶│          │
//!  └──────────┘   ticks      └───────────┘                   │ Strategy Engine  │  policies   │  Trader  │
//!                            ┌───────────┐  feedback_queue   │  (RiskEngine)    │             │  (EA)    │
//!                            │ Feedback  │ ─────────────────▶│                  │             │          │
//!                            └───────────┘                   └──────────────────┘             └──────────┘
//!                                  ▲            PULL :7779  trade results                          │
//!                                  └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Environment Variables
//!
//! See [`config`] and [`risk`] for the full list.  `RUST_LOG` overrides the
//! default `flashea_brain=debug` filter.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod codec;
mod config;
mod engine;
mod error;
mod events;
mod models;
mod queue;
mod risk;
mod routes;
mod shutdown;
mod stages;
mod state;
mod supervisor;
mod transport;

use config::BrainConfig;
use shutdown::ShutdownSignal;
use state::build_state;
use supervisor::{shutdown_latency, Supervisor};

// ─── Entry Point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env (optional) ──────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env()
            .add_directive("flashea_brain=debug".parse()?)
            .add_directive("tower_http=info".parse()?))
        .init();

    info!(
        r#"

  ╔═══════════════════════════════════════════════╗
  ║        FLASHEA BRAIN — Policy Hub             ║
  ║        Ingestion · Risk · Policy              ║
  ╚═══════════════════════════════════════════════╝"#
    );

    // ── 3. Config ────────────────────────────────────────────────────────────
    let config = BrainConfig::from_env()?;
    config.log_summary();
    info!(latency = ?shutdown_latency(&config), "Expected shutdown latency");

    // ── 4. Shared state + shutdown flag ──────────────────────────────────────
    let (state, risk_tx) = build_state(&config.queues);
    let shutdown = ShutdownSignal::new();

    tokio::spawn(watch_os_signals(shutdown.clone()));

    // ── 5. Optional monitor ──────────────────────────────────────────────────
    if let Some(raw) = &config.monitor_addr {
        let addr: SocketAddr = raw
            .parse()
            .with_context(|| format!("MONITOR_BIND_ADDR '{raw}' is not a socket address"))?;
        let (state, shutdown) = (state.clone(), shutdown.clone());
        tokio::spawn(async move {
            if let Err(e) = routes::serve(addr, state, shutdown).await {
                error!(error = %e, "Monitor server stopped");
            }
        });
    }

    // ── 6. Stages ────────────────────────────────────────────────────────────
    let mut supervisor = Supervisor::new(config, state, risk_tx, shutdown);
    supervisor
        .start()
        .await
        .context("Brain failed to start")?;

    info!("🚀 FlashEA Brain running — Ctrl+C to stop");
    supervisor.watch().await;

    let report = supervisor.stop().await;
    if !report.timed_out.is_empty() {
        warn!(stages = ?report.timed_out, "Some stages did not stop in time");
    }
    info!("👋 FlashEA Brain stopped");
    Ok(())
}

// ─── OS signals ───────────────────────────────────────────────────────────────

async fn watch_os_signals(shutdown: ShutdownSignal) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Ctrl+C handler unavailable");
                return;
            }
            info!("Ctrl+C received");
        }
        _ = terminate => info!("SIGTERM received"),
    }

    if shutdown.trigger() {
        info!("⏹️ Shutdown signal raised");
    }
}
