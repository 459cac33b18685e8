//! # supervisor
//!
//! Starts the three stages in order, watches them, and tears them down.
//!
//! ```text
//!  Ingestion ──(settle)──▶ Strategy Engine ──(settle)──▶ Feedback Listener
//! ```
//!
//! Dead stages and deep queues are reported, never restarted.  The only
//! startup failure that stops the Brain is the Strategy Engine failing to
//! bind the policy endpoint.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::BrainConfig;
use crate::engine::orchestrator::run_strategy_engine;
use crate::error::BrainError;
use crate::risk::RiskSnapshot;
use crate::shutdown::ShutdownSignal;
use crate::stages::feedback::run_feedback_listener;
use crate::stages::ingestion::run_ingestion;
use crate::state::SharedState;

struct Unit {
    name:   &'static str,
    handle: JoinHandle<Result<(), BrainError>>,
    /// Already reported dead by the health check.
    reported_dead: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageHealth {
    pub name:  &'static str,
    pub alive: bool,
}

/// Result of one health poll.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub stages:    Vec<StageHealth>,
    /// Queues deeper than the warning threshold.
    pub backed_up: Vec<&'static str>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Stages that did not stop within the join timeout.
    pub timed_out:         Vec<&'static str>,
    pub drained_ticks:     usize,
    pub drained_feedback:  usize,
}

pub struct Supervisor {
    config:   BrainConfig,
    shared:   SharedState,
    shutdown: ShutdownSignal,
    units:    Vec<Unit>,
    risk_tx:  Option<watch::Sender<RiskSnapshot>>,
}

impl Supervisor {
    pub fn new(
        config: BrainConfig,
        shared: SharedState,
        risk_tx: watch::Sender<RiskSnapshot>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            config,
            shared,
            shutdown,
            units: Vec::new(),
            risk_tx: Some(risk_tx),
        }
    }

    #[cfg(test)]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    // ─── Start ────────────────────────────────────────────────────────────────

    /// Spawn Ingestion → Strategy Engine → Feedback Listener.
    ///
    /// Returns the engine's bind error if it never reached RUNNING; every
    /// already-started stage has been stopped by then.
    pub async fn start(&mut self) -> Result<(), BrainError> {
        let settle = self.config.supervisor.settle_delay;

        self.spawn("ingestion", run_ingestion(
            self.config.transport.clone(),
            self.shared.clone(),
            self.shutdown.clone(),
        ));
        tokio::time::sleep(settle).await;

        let risk_tx = match self.risk_tx.take() {
            Some(tx) => tx,
            None => {
                warn!("Supervisor already started");
                return Ok(());
            }
        };
        self.spawn("strategy", run_strategy_engine(
            self.config.clone(),
            self.shared.clone(),
            risk_tx,
            self.shutdown.clone(),
        ));
        tokio::time::sleep(settle).await;

        if let Some(err) = self.take_startup_failure("strategy").await {
            error!(error = %err, "❌ FATAL: strategy engine failed to start");
            self.stop().await;
            return Err(err);
        }

        self.spawn("feedback", run_feedback_listener(
            self.config.transport.clone(),
            self.shared.clone(),
            self.shutdown.clone(),
        ));
        tokio::time::sleep(settle).await;

        info!(stages = self.units.len(), "✅ All stages started");
        Ok(())
    }

    fn spawn<F>(&mut self, name: &'static str, stage: F)
    where
        F: std::future::Future<Output = Result<(), BrainError>> + Send + 'static,
    {
        info!(stage = name, "▶️ Starting stage");
        self.units.push(Unit {
            name,
            handle: tokio::spawn(stage),
            reported_dead: false,
        });
    }

    /// If `name` already finished with a bind failure, remove it and return the error.
    async fn take_startup_failure(&mut self, name: &str) -> Option<BrainError> {
        let idx = self
            .units
            .iter()
            .position(|u| u.name == name && u.handle.is_finished())?;
        let unit = self.units.remove(idx);
        match unit.handle.await {
            Ok(Err(e @ BrainError::TransportSetup { .. })) => Some(e),
            Ok(Err(e)) => {
                warn!(stage = name, error = %e, "Stage exited with error during startup");
                None
            }
            Ok(Ok(())) => None,
            Err(join) => Some(BrainError::transport(name, join)),
        }
    }

    // ─── Watch ────────────────────────────────────────────────────────────────

    /// Liveness and queue-depth check, logging anything degraded.
    pub fn check_health(&mut self) -> HealthReport {
        let stages: Vec<StageHealth> = self
            .units
            .iter_mut()
            .map(|unit| {
                let alive = !unit.handle.is_finished();
                if !alive && !unit.reported_dead {
                    unit.reported_dead = true;
                    error!(stage = unit.name, "💀 Stage is dead — not restarting");
                }
                StageHealth { name: unit.name, alive }
            })
            .collect();

        let warn_depth = self.config.queues.warn_depth;
        let ticks = &self.shared.ingestion_queue;
        let feedback = &self.shared.feedback_queue;
        let mut backed_up = Vec::new();
        for (queue, depth, capacity) in [
            (ticks.name(), ticks.len(), ticks.capacity()),
            (feedback.name(), feedback.len(), feedback.capacity()),
        ] {
            if depth > warn_depth {
                warn!(queue, depth, limit = warn_depth, ?capacity, "⚠️ Queue backing up");
                backed_up.push(queue);
            }
        }

        HealthReport { stages, backed_up }
    }

    /// Poll health until the shutdown signal is raised.
    pub async fn watch(&mut self) {
        let poll = self.config.supervisor.poll_interval;
        while self.shutdown.sleep(poll).await {
            self.check_health();
        }
        info!("Shutdown requested");
    }

    // ─── Stop ─────────────────────────────────────────────────────────────────

    /// Raise the shutdown flag, join every stage with a timeout, then drain.
    pub async fn stop(&mut self) -> ShutdownReport {
        self.shutdown.trigger();
        info!("🛑 Stopping stages…");

        let join_timeout = self.config.supervisor.join_timeout;
        let mut report = ShutdownReport::default();

        for unit in self.units.drain(..) {
            match tokio::time::timeout(join_timeout, unit.handle).await {
                Ok(Ok(Ok(()))) => info!(stage = unit.name, "Stage stopped"),
                Ok(Ok(Err(e))) => warn!(stage = unit.name, error = %e, "Stage stopped with error"),
                Ok(Err(join)) => error!(stage = unit.name, error = %join, "Stage panicked"),
                Err(_) => {
                    error!(stage = unit.name, timeout = ?join_timeout, "⏱️ Stage did not stop in time");
                    report.timed_out.push(unit.name);
                }
            }
        }

        report.drained_ticks = self.shared.ingestion_queue.drain();
        report.drained_feedback = self.shared.feedback_queue.drain();
        info!(
            ticks    = report.drained_ticks,
            feedback = report.drained_feedback,
            "🧹 Queues drained"
        );
        report
    }
}

/// Nominal worst-case time for a stage to notice shutdown.
pub fn shutdown_latency(config: &BrainConfig) -> Duration {
    config.transport.recv_timeout.max(config.engine.tick_wait)
}
