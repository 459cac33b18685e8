//! # routes::monitor
//!
//! Read-only view of a running Brain.
//!
//! | Method    | Path                  | Description                               |
//! |-----------|-----------------------|-------------------------------------------|
//! | GET       | `/api/health`         | Liveness + uptime                         |
//! | GET       | `/api/monitor/stats`  | Stage counters, queue depths, engine stats|
//! | GET       | `/api/monitor/risk`   | Latest risk snapshot                      |
//! | GET (WS)  | `/ws/monitor`         | Live `BrainEvent` JSON stream             |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::state::SharedState;

// ─── WebSocket ────────────────────────────────────────────────────────────────

pub async fn ws_monitor(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 Monitor client connected");

    // current risk view first, then the live stream
    let snapshot = json!({
        "event": "SNAPSHOT",
        "risk":  state.risk_snapshot(),
        "stats": stats_body(&state),
    })
    .to_string();

    if sender.send(Message::Text(snapshot)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => match result {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => debug!("Monitor client lagged, skipped {n} events"),
                Err(RecvError::Closed) => break,
            },

            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(Message::Ping(data))) => {
                    let _ = sender.send(Message::Pong(data)).await;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    info!("🔌 Monitor client disconnected");
}

// ─── REST ─────────────────────────────────────────────────────────────────────

pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    Json(json!({
        "ok":          true,
        "service":     "flashea-brain",
        "started_at":  state.started_at,
        "uptime_secs": uptime,
    }))
}

pub async fn get_stats(State(state): State<SharedState>) -> impl IntoResponse {
    Json(stats_body(&state))
}

pub async fn get_risk(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":   true,
        "risk": state.risk_snapshot(),
    }))
}

fn stats_body(state: &SharedState) -> serde_json::Value {
    json!({
        "ok":        true,
        "ingestion": state.ingestion_stats.snapshot(),
        "feedback":  state.feedback_stats.snapshot(),
        "engine":    state.engine_stats.snapshot(),
        "queues": {
            "ingestion": state.ingestion_queue.len(),
            "feedback":  state.feedback_queue.len(),
        },
    })
}
