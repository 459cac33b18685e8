//! # engine::orchestrator
//!
//! The **Strategy Engine** — the only task that touches [`RiskEngine`].
//!
//! ```text
//!  feedback_queue ──▶ (1) process result ──▶ RiskState ──▶ watch<RiskSnapshot>
//!  ingestion_queue ─▶ (2) analyze tick ──▶ signal? ──▶ publish_signal
//!                    (3) every 5 s ──────────────────▶ publish_heartbeat
//!                    (4) every 10 s ─────────────────▶ dashboard
//! ```
//!
//! Feedback always goes first in an iteration, so a tick is never judged
//! against risk state more than one iteration old.

use std::sync::atomic::Ordering;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{BrainConfig, EngineConfig};
use crate::engine::analyzer::{MarketAnalyzer, Signal};
#[cfg(test)]
use crate::engine::analyzer::SignalGenerator;
use crate::engine::publisher::{PolicyPublisher, PolicySink};
use crate::engine::strength::{NeutralStrength, StrengthSource};
use crate::error::BrainError;
use crate::events::BrainEvent;
use crate::models::{Action, Tick, TradeResult};
use crate::risk::{FeedbackOutcome, RiskEngine, RiskSnapshot};
use crate::shutdown::ShutdownSignal;
use crate::state::SharedState;
use crate::transport::{bind_pub, close_socket, ZmqPolicySink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

pub struct StrategyEngine<S> {
    config:         EngineConfig,
    shared:         SharedState,
    risk:           RiskEngine,
    analyzer:       MarketAnalyzer,
    publisher:      PolicyPublisher<S>,
    strength:       Box<dyn StrengthSource>,
    risk_tx:        watch::Sender<RiskSnapshot>,
    phase:          EngineState,
    last_heartbeat: Option<Instant>,
    last_dashboard: Instant,
}

impl<S: PolicySink> StrategyEngine<S> {
    pub fn new(
        config: &BrainConfig,
        shared: SharedState,
        risk_tx: watch::Sender<RiskSnapshot>,
        sink: S,
    ) -> Self {
        Self {
            config:         config.engine.clone(),
            shared,
            risk:           RiskEngine::new(config.risk.clone()),
            analyzer:       MarketAnalyzer::with_no_signal(config.engine.tick_history),
            publisher:      PolicyPublisher::new(sink),
            strength:       Box::new(NeutralStrength),
            risk_tx,
            phase:          EngineState::Starting,
            last_heartbeat: None,
            last_dashboard: Instant::now(),
        }
    }

    #[cfg(test)]
    pub fn with_generator(mut self, generator: Box<dyn SignalGenerator>) -> Self {
        self.analyzer = MarketAnalyzer::new(self.config.tick_history, generator);
        self
    }

    #[cfg(test)]
    pub fn with_strength(mut self, strength: Box<dyn StrengthSource>) -> Self {
        self.strength = strength;
        self
    }

    #[cfg(test)]
    pub fn phase(&self) -> EngineState {
        self.phase
    }

    #[cfg(test)]
    pub fn risk(&self) -> &RiskEngine {
        &self.risk
    }

    // ─── Loop ─────────────────────────────────────────────────────────────────

    /// Iterate until shutdown, then hand the sink back for closing.
    pub async fn run(mut self, shutdown: &ShutdownSignal) -> S {
        self.phase = EngineState::Running;
        info!(
            loop_idle = ?self.config.loop_idle,
            tick_wait = ?self.config.tick_wait,
            "🧠 Strategy engine RUNNING"
        );

        while !shutdown.is_triggered() {
            self.step().await;
            tokio::time::sleep(self.config.loop_idle).await;
        }

        self.phase = EngineState::Stopping;
        debug!(phase = ?self.phase, "Strategy engine leaving loop");
        let counts = self.shared.engine_stats.snapshot();
        let s = self.risk.state();
        info!(
            ticks    = counts.ticks,
            policies = counts.policies,
            feedback = counts.feedback,
            trades   = s.total_trades,
            profit   = s.total_profit,
            "🛑 Strategy engine stopping"
        );
        self.phase = EngineState::Stopped;
        self.publisher.into_sink()
    }

    /// One iteration: feedback, tick, heartbeat, dashboard.
    pub async fn step(&mut self) {
        if let Some(result) = self.shared.feedback_queue.try_pop() {
            self.handle_feedback(&result);
        }

        if let Some(tick) = self.shared.ingestion_queue.pop_timeout(self.config.tick_wait).await {
            self.handle_tick(&tick).await;
        }

        let heartbeat_due = self
            .last_heartbeat
            .map_or(true, |at| at.elapsed() >= self.config.heartbeat_interval);
        if heartbeat_due {
            self.heartbeat().await;
        }

        if self.last_dashboard.elapsed() >= self.config.dashboard_interval {
            self.dashboard();
            self.last_dashboard = Instant::now();
        }
    }

    // ─── (1) Feedback ─────────────────────────────────────────────────────────

    fn handle_feedback(&mut self, result: &TradeResult) {
        self.shared.engine_stats.feedback.fetch_add(1, Ordering::Relaxed);

        let outcome = self.risk.process(result);

        self.shared.broadcast(&BrainEvent::TradeResult {
            ticket:  result.ticket,
            symbol:  result.symbol.clone(),
            side:    result.side,
            profit:  result.profit,
            outcome: result.outcome(),
        });

        match outcome {
            FeedbackOutcome::Win { hot_streak, cooldown_cancelled } => {
                if cooldown_cancelled {
                    self.shared.broadcast(&BrainEvent::CooldownCancelled);
                }
                if hot_streak {
                    self.shared.broadcast(&BrainEvent::HotStreak {
                        consecutive_wins: self.risk.state().consecutive_wins,
                    });
                }
            }
            FeedbackOutcome::Loss { cooldown, until } => {
                self.shared.broadcast(&BrainEvent::CooldownStarted {
                    kind: cooldown,
                    until,
                    consecutive_losses: self.risk.state().consecutive_losses,
                });
            }
            FeedbackOutcome::Breakeven => {}
        }

        self.publish_snapshot();
    }

    // ─── (2) Tick ─────────────────────────────────────────────────────────────

    async fn handle_tick(&mut self, tick: &Tick) {
        self.shared.engine_stats.ticks.fetch_add(1, Ordering::Relaxed);

        let in_cooldown = self.risk.is_in_cooldown();
        let Some(signal) = self.analyzer.analyze(tick, in_cooldown) else {
            return;
        };

        if signal.confidence < self.config.min_signal_confidence {
            self.shared.engine_stats.signals_suppressed.fetch_add(1, Ordering::Relaxed);
            debug!(
                symbol     = %tick.symbol,
                confidence = signal.confidence,
                threshold  = self.config.min_signal_confidence,
                "Signal below confidence threshold — not published"
            );
            return;
        }
        if signal.confidence >= self.config.high_confidence_threshold {
            info!(
                symbol     = %tick.symbol,
                direction  = signal.direction.as_str(),
                confidence = signal.confidence,
                "⚡ High-conviction signal"
            );
        }

        self.publish_signal(&signal, &tick.symbol).await;
    }

    async fn publish_signal(&mut self, signal: &Signal, symbol: &str) {
        match self.publisher.publish_signal(signal, symbol, &self.risk).await {
            Ok(policy) => {
                self.shared.engine_stats.policies.fetch_add(1, Ordering::Relaxed);
                self.shared.broadcast(&BrainEvent::PolicyPublished {
                    symbol:     policy.symbol,
                    action:     policy.action,
                    confidence: policy.confidence,
                    heartbeat:  false,
                });
            }
            Err(e) => {
                self.shared.engine_stats.publish_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, symbol, "Policy publish failed");
            }
        }
    }

    // ─── (3) Heartbeat ────────────────────────────────────────────────────────

    async fn heartbeat(&mut self) {
        self.last_heartbeat = Some(Instant::now());

        let symbol = self.config.heartbeat_symbol.clone();
        let published = self
            .publisher
            .publish_heartbeat(&symbol, &mut self.risk, self.strength.as_ref())
            .await;

        match published {
            Ok(policy) => {
                self.shared.engine_stats.policies.fetch_add(1, Ordering::Relaxed);
                self.shared.broadcast(&BrainEvent::PolicyPublished {
                    symbol:     policy.symbol,
                    action:     Action::Hold,
                    confidence: policy.confidence,
                    heartbeat:  true,
                });
            }
            Err(e) => {
                self.shared.engine_stats.publish_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Heartbeat publish failed");
            }
        }

        // the cooldown check above may have cleared an expired window
        self.publish_snapshot();
    }

    // ─── (4) Dashboard ────────────────────────────────────────────────────────

    fn dashboard(&mut self) {
        let snap = self.risk.snapshot();
        let counts = self.shared.engine_stats.snapshot();

        info!(
            ticks    = counts.ticks,
            policies = counts.policies,
            wins     = snap.total_wins,
            losses   = snap.total_losses,
            profit   = snap.total_profit,
            risk     = snap.risk_multiplier,
            cooldown_remaining_secs = snap.cooldown_remaining_secs.unwrap_or(0.0),
            ingestion_depth = self.shared.ingestion_queue.len(),
            feedback_depth  = self.shared.feedback_queue.len(),
            "📊 DASHBOARD"
        );

        self.shared.broadcast(&BrainEvent::Dashboard {
            ticks:           counts.ticks,
            policies:        counts.policies,
            total_trades:    snap.total_trades,
            total_wins:      snap.total_wins,
            total_losses:    snap.total_losses,
            total_profit:    snap.total_profit,
            risk_multiplier: snap.risk_multiplier,
            in_cooldown:     snap.in_cooldown,
            cooldown_remaining_secs: snap.cooldown_remaining_secs,
        });

        self.risk_tx.send_replace(snap);
    }

    fn publish_snapshot(&mut self) {
        self.risk_tx.send_replace(self.risk.snapshot());
    }
}

// ─── Task entry point ─────────────────────────────────────────────────────────

/// STARTING → RUNNING → STOPPING → STOPPED over the live PUB socket.
///
/// A bind failure is returned before RUNNING is ever entered; the
/// Supervisor treats that as fatal to the process.
pub async fn run_strategy_engine(
    config: BrainConfig,
    shared: SharedState,
    risk_tx: watch::Sender<RiskSnapshot>,
    shutdown: ShutdownSignal,
) -> Result<(), BrainError> {
    let transport = &config.transport;
    let (socket, endpoint) = match bind_pub(&transport.policy_addr).await {
        Ok(bound) => bound,
        Err(e) => {
            error!(error = %e, "❌ Strategy engine failed to bind policy endpoint");
            return Err(e);
        }
    };
    info!(%endpoint, "📡 Policy publisher bound");

    // subscribers need a moment to attach before the first heartbeat
    if shutdown.sleep(config.engine.warmup).await {
        let sink = ZmqPolicySink::new(socket, transport.send_timeout);
        let engine = StrategyEngine::new(&config, shared, risk_tx, sink);
        let sink = engine.run(&shutdown).await;
        sink.close(transport.linger).await;
    } else {
        close_socket(socket, transport.linger, "policy").await;
    }

    info!("✅ Strategy engine STOPPED");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::test_config;
    use crate::engine::analyzer::Direction;
    use crate::engine::publisher::memory::MemorySink;
    use crate::models::trade::sample_result;
    use crate::models::PolicyMessage;
    use crate::state::build_state;

    struct FixedSignal {
        calls:      Arc<AtomicUsize>,
        confidence: f64,
    }

    impl SignalGenerator for FixedSignal {
        fn evaluate(&mut self, _tick: &Tick, _history: &VecDeque<Tick>) -> Option<Signal> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(Signal { direction: Direction::Buy, confidence: self.confidence })
        }
    }

    fn engine() -> (StrategyEngine<MemorySink>, SharedState, MemorySink, watch::Receiver<RiskSnapshot>) {
        let config = test_config();
        let (shared, risk_tx) = build_state(&config.queues);
        let risk_rx = risk_tx.subscribe();
        let sink = MemorySink::default();
        let engine = StrategyEngine::new(&config, shared.clone(), risk_tx, sink.clone());
        (engine, shared, sink, risk_rx)
    }

    fn tick() -> Tick {
        Tick::new("XAUUSD", 2030.10, 2030.35, 1_700_000_000_000)
    }

    fn directional(sink: &MemorySink) -> Vec<PolicyMessage> {
        sink.decoded()
            .into_iter()
            .filter(|p| matches!(p, PolicyMessage::Directional(_)))
            .collect()
    }

    #[tokio::test]
    async fn winning_trade_raises_risk() {
        let (mut engine, shared, _sink, risk_rx) = engine();
        shared.feedback_queue.push(sample_result(1, 15.75)).unwrap();

        engine.step().await;

        let s = engine.risk().state();
        assert_eq!(s.total_wins, 1);
        assert!((s.risk_multiplier - 1.1).abs() < 1e-9);
        assert!(!engine.risk.is_in_cooldown());
        assert_eq!(risk_rx.borrow().total_wins, 1);
        assert_eq!(shared.engine_stats.snapshot().feedback, 1);
    }

    #[tokio::test]
    async fn three_losses_trigger_emergency_cooldown() {
        let (mut engine, shared, _sink, risk_rx) = engine();
        let mut events = shared.broadcast_tx.subscribe();
        for ticket in 1..=3 {
            shared.feedback_queue.push(sample_result(ticket, -10.0)).unwrap();
        }
        for _ in 0..3 {
            engine.step().await;
        }

        assert!(engine.risk.is_in_cooldown());
        let remaining = engine.risk().cooldown_remaining(chrono::Utc::now()).expect("cooldown");
        assert!((remaining.num_milliseconds() as f64 / 1000.0 - 300.0).abs() < 1.0);
        assert!(risk_rx.borrow().in_cooldown);
        assert_eq!(risk_rx.borrow().confidence, 0.0);

        let mut kinds = Vec::new();
        while let Ok(json) = events.try_recv() {
            if json.contains("COOLDOWN_STARTED") {
                kinds.push(json.contains(r#""kind":"EMERGENCY""#));
            }
        }
        assert_eq!(kinds, vec![false, false, true]);
    }

    #[tokio::test]
    async fn tick_during_cooldown_skips_analysis() {
        let (engine, shared, sink, _) = engine();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut engine = engine.with_generator(Box::new(FixedSignal { calls: calls.clone(), confidence: 0.9 }));

        // feedback is drained before the tick within the same iteration
        shared.feedback_queue.push(sample_result(1, -10.0)).unwrap();
        shared.ingestion_queue.push(tick()).unwrap();
        engine.step().await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(shared.engine_stats.snapshot().ticks, 1);
        assert!(directional(&sink).is_empty());
    }

    #[tokio::test]
    async fn confident_signal_is_published_risk_adjusted() {
        let (engine, shared, sink, _) = engine();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut engine = engine.with_generator(Box::new(FixedSignal { calls, confidence: 0.9 }));

        shared.ingestion_queue.push(tick()).unwrap();
        engine.step().await;

        let published = directional(&sink);
        assert_eq!(published.len(), 1);
        match &published[0] {
            PolicyMessage::Directional(p) => {
                assert_eq!(p.action, Action::Buy);
                assert!((p.confidence - 0.9).abs() < 1e-9);
                assert_eq!(p.symbol, "XAUUSD");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn weak_signal_is_suppressed() {
        let (engine, shared, sink, _) = engine();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut engine = engine.with_generator(Box::new(FixedSignal { calls: calls.clone(), confidence: 0.4 }));

        shared.ingestion_queue.push(tick()).unwrap();
        engine.step().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(directional(&sink).is_empty());
        assert_eq!(shared.engine_stats.snapshot().signals_suppressed, 1);
    }

    #[tokio::test]
    async fn heartbeat_is_immediate_then_periodic() {
        let (mut engine, shared, sink, _) = engine();

        engine.step().await;
        engine.step().await;

        let sent = sink.decoded();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].action(), Action::Hold);
        assert_eq!(sent[0].symbol(), "XAUUSD");
        assert_eq!(shared.engine_stats.snapshot().policies, 1);
    }

    #[tokio::test]
    async fn failing_sink_is_counted_not_fatal() {
        let config = test_config();
        let (shared, risk_tx) = build_state(&config.queues);
        let sink = MemorySink { fail: true, ..MemorySink::default() };
        let mut engine = StrategyEngine::new(&config, shared.clone(), risk_tx, sink);

        engine.step().await;
        shared.feedback_queue.push(sample_result(1, 1.0)).unwrap();
        engine.step().await;

        let counts = shared.engine_stats.snapshot();
        assert_eq!(counts.publish_errors, 1);
        assert_eq!(counts.feedback, 1);
    }

    #[tokio::test]
    async fn heartbeat_uses_configured_strength_source() {
        struct UsdStrong;
        impl StrengthSource for UsdStrong {
            fn strengths(&self) -> Option<std::collections::BTreeMap<String, f64>> {
                Some([("USD".to_string(), 7.5)].into_iter().collect())
            }
        }

        let (engine, _shared, sink, _) = engine();
        let mut engine = engine.with_strength(Box::new(UsdStrong));
        assert_eq!(engine.phase(), EngineState::Starting);
        engine.step().await;

        match &sink.decoded()[0] {
            PolicyMessage::Telemetry(p) => {
                assert_eq!(p.csm["USD"], 7.5);
                assert_eq!(p.csm["JPY"], 0.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (engine, _shared, _sink, _) = engine();
        let shutdown = ShutdownSignal::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.trigger();
        });

        let returned = tokio::time::timeout(Duration::from_secs(2), engine.run(&shutdown))
            .await
            .expect("engine stopped");
        assert!(!returned.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn bind_conflict_fails_before_running() {
        let (_held, endpoint) = bind_pub("tcp://127.0.0.1:0").await.unwrap();
        let mut config = test_config();
        config.transport.policy_addr = endpoint;
        let (shared, risk_tx) = build_state(&config.queues);

        let result = run_strategy_engine(config, shared, risk_tx, ShutdownSignal::new()).await;
        assert!(matches!(result, Err(BrainError::TransportSetup { .. })));
    }
}
