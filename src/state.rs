//! # state
//!
//! [`BrainState`] holds what the stages share: the hand-off queues, per-stage
//! counters, the event broadcast channel and the latest risk snapshot.
//!
//! `RiskState` is not in here.  The Strategy Engine owns it and publishes
//! copies through the `watch` channel whose sender `build_state` returns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::config::QueueConfig;
use crate::events::BrainEvent;
use crate::models::{Tick, TradeResult};
use crate::queue::StageQueue;
use crate::risk::RiskSnapshot;

// ─── Stage counters ───────────────────────────────────────────────────────────

/// Counters kept by a receiving stage.
#[derive(Debug, Default)]
pub struct StageStats {
    pub received: AtomicU64,
    /// Decode failures and socket errors.
    pub errors:   AtomicU64,
    /// Items rejected by a full queue (also counted in `errors`).
    pub dropped:  AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub received: u64,
    pub errors:   u64,
    pub dropped:  u64,
}

impl StageStats {
    pub fn snapshot(&self) -> StageCounts {
        StageCounts {
            received: self.received.load(Ordering::Relaxed),
            errors:   self.errors.load(Ordering::Relaxed),
            dropped:  self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Counters kept by the Strategy Engine.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub ticks:              AtomicU64,
    pub feedback:           AtomicU64,
    pub policies:           AtomicU64,
    pub signals_suppressed: AtomicU64,
    pub publish_errors:     AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineCounts {
    pub ticks:              u64,
    pub feedback:           u64,
    pub policies:           u64,
    pub signals_suppressed: u64,
    pub publish_errors:     u64,
}

impl EngineStats {
    pub fn snapshot(&self) -> EngineCounts {
        EngineCounts {
            ticks:              self.ticks.load(Ordering::Relaxed),
            feedback:           self.feedback.load(Ordering::Relaxed),
            policies:           self.policies.load(Ordering::Relaxed),
            signals_suppressed: self.signals_suppressed.load(Ordering::Relaxed),
            publish_errors:     self.publish_errors.load(Ordering::Relaxed),
        }
    }
}

// ─── BrainState ───────────────────────────────────────────────────────────────

pub struct BrainState {
    pub ingestion_queue: Arc<StageQueue<Tick>>,
    pub feedback_queue:  Arc<StageQueue<TradeResult>>,

    pub ingestion_stats: Arc<StageStats>,
    pub feedback_stats:  Arc<StageStats>,
    pub engine_stats:    Arc<EngineStats>,

    /// Pre-serialised [`BrainEvent`] JSON for monitor subscribers.
    pub broadcast_tx: broadcast::Sender<String>,

    /// Latest risk view, written only by the Strategy Engine.
    pub risk_rx: watch::Receiver<RiskSnapshot>,

    pub started_at: DateTime<Utc>,
}

impl BrainState {
    /// Fire-and-forget: no subscribers is not an error.
    pub fn broadcast(&self, event: &BrainEvent) {
        let _ = self.broadcast_tx.send(event.to_json());
    }

    pub fn risk_snapshot(&self) -> RiskSnapshot {
        self.risk_rx.borrow().clone()
    }
}

pub type SharedState = Arc<BrainState>;

/// Build the shared state plus the single writer of the risk view.
pub fn build_state(queues: &QueueConfig) -> (SharedState, watch::Sender<RiskSnapshot>) {
    let (broadcast_tx, _) = broadcast::channel(256);
    let (risk_tx, risk_rx) = watch::channel(RiskSnapshot {
        risk_multiplier: 1.0,
        confidence:      0.5,
        ..RiskSnapshot::default()
    });

    let state = BrainState {
        ingestion_queue: Arc::new(StageQueue::new("ingestion", queues.ingestion_capacity)),
        feedback_queue:  Arc::new(StageQueue::new("feedback", queues.feedback_capacity)),
        ingestion_stats: Arc::new(StageStats::default()),
        feedback_stats:  Arc::new(StageStats::default()),
        engine_stats:    Arc::new(EngineStats::default()),
        broadcast_tx,
        risk_rx,
        started_at:      Utc::now(),
    };

    (Arc::new(state), risk_tx)
}
