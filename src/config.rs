//! # config — runtime settings read from Environment Variables
//!
//! Every knob has a default so the Brain starts with nothing but the three
//! endpoint defaults below.  `.env` is loaded by `main` before this runs.
//!
//! | Variable                    | Default                 | Description                          |
//! |-----------------------------|-------------------------|--------------------------------------|
//! | `ZMQ_FEEDER_ADDR`           | `tcp://127.0.0.1:7777`  | Tick feed (SUB, bound)               |
//! | `ZMQ_POLICY_ADDR`           | `tcp://127.0.0.1:7778`  | Policy stream (PUB, bound)           |
//! | `ZMQ_FEEDBACK_ADDR`         | `tcp://127.0.0.1:7779`  | Trade results (PULL, bound)          |
//! | `ZMQ_RCVTIMEO_MS`           | `1000`                  | Stage receive timeout                |
//! | `ZMQ_SNDTIMEO_MS`           | `100`                   | Policy send timeout                  |
//! | `ZMQ_LINGER_MS`             | `1000`                  | Max wait when closing a socket       |
//! | `INGESTION_QUEUE_CAP`       | `0` (unbounded)         | Tick queue capacity                  |
//! | `FEEDBACK_QUEUE_CAP`        | `0` (unbounded)         | Trade-result queue capacity          |
//! | `HEARTBEAT_INTERVAL_MS`     | `5000`                  | Telemetry policy period              |
//! | `MONITOR_BIND_ADDR`         | unset (disabled)        | Read-only HTTP monitor               |
//!
//! Risk knobs (`RISK_*`, `COOLDOWN_*`) are documented in [`crate::risk`].

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::info;

use crate::risk::{RiskConfig, MAX_COOLDOWN_SECS};

/// Read `key` and parse it, falling back to `default` when unset or invalid.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn env_ms(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_or(key, default_ms))
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

// ─── Transport ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub feeder_addr:   String,
    pub policy_addr:   String,
    pub feedback_addr: String,
    /// High-water marks of the tick SUB and policy PUB sockets.
    pub sub_hwm: u32,
    pub pub_hwm: u32,
    pub recv_timeout: Duration,
    pub send_timeout: Duration,
    pub linger:       Duration,
    /// Reconnect backoff bounds advertised to connecting peers.
    pub reconnect_ivl:     Duration,
    pub reconnect_ivl_max: Duration,
}

impl TransportConfig {
    pub fn from_env() -> Self {
        Self {
            feeder_addr:       env_string("ZMQ_FEEDER_ADDR", "tcp://127.0.0.1:7777"),
            policy_addr:       env_string("ZMQ_POLICY_ADDR", "tcp://127.0.0.1:7778"),
            feedback_addr:     env_string("ZMQ_FEEDBACK_ADDR", "tcp://127.0.0.1:7779"),
            sub_hwm:           env_or("ZMQ_SUB_HWM", 10_000),
            pub_hwm:           env_or("ZMQ_PUB_HWM", 10_000),
            recv_timeout:      env_ms("ZMQ_RCVTIMEO_MS", 1_000),
            send_timeout:      env_ms("ZMQ_SNDTIMEO_MS", 100),
            linger:            env_ms("ZMQ_LINGER_MS", 1_000),
            reconnect_ivl:     env_ms("ZMQ_RECONNECT_IVL_MS", 100),
            reconnect_ivl_max: env_ms("ZMQ_RECONNECT_IVL_MAX_MS", 5_000),
        }
    }
}

// ─── Queues ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// 0 = unbounded
    pub ingestion_capacity: usize,
    /// 0 = unbounded
    pub feedback_capacity:  usize,
    /// Supervisor warns when any queue grows beyond this depth.
    pub warn_depth: usize,
}

impl QueueConfig {
    pub fn from_env() -> Self {
        Self {
            ingestion_capacity: env_or("INGESTION_QUEUE_CAP", 0),
            feedback_capacity:  env_or("FEEDBACK_QUEUE_CAP", 0),
            warn_depth:         env_or("QUEUE_WARN_DEPTH", 100),
        }
    }
}

// ─── Strategy Engine ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub heartbeat_interval: Duration,
    pub heartbeat_symbol:   String,
    pub dashboard_interval: Duration,
    /// Bounded wait for a tick on each iteration.
    pub tick_wait: Duration,
    /// Sleep at the end of every iteration (iteration budget).
    pub loop_idle: Duration,
    /// Pause between binding the policy socket and the first iteration.
    pub warmup: Duration,
    pub tick_history: usize,
    /// Signals below this confidence are not published.
    pub min_signal_confidence:  f64,
    pub high_confidence_threshold: f64,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            heartbeat_interval: env_ms("HEARTBEAT_INTERVAL_MS", 5_000),
            heartbeat_symbol:   env_string("HEARTBEAT_SYMBOL", "XAUUSD"),
            dashboard_interval: Duration::from_secs(env_or("DASHBOARD_INTERVAL_SECS", 10)),
            tick_wait:          env_ms("ENGINE_TICK_WAIT_MS", 100),
            loop_idle:          env_ms("ENGINE_LOOP_IDLE_MS", 10),
            warmup:             env_ms("ENGINE_WARMUP_MS", 1_000),
            tick_history:       env_or("TICK_HISTORY_SIZE", 100),
            min_signal_confidence:     env_or("MIN_SIGNAL_CONFIDENCE", 0.65),
            high_confidence_threshold: env_or("HIGH_CONFIDENCE_THRESHOLD", 0.85),
        }
    }
}

// ─── Supervisor ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Delay between starting consecutive stages.
    pub settle_delay:  Duration,
    pub poll_interval: Duration,
    /// Per-stage join timeout at shutdown.
    pub join_timeout:  Duration,
}

impl SupervisorConfig {
    pub fn from_env() -> Self {
        Self {
            settle_delay:  env_ms("SUPERVISOR_SETTLE_MS", 500),
            poll_interval: Duration::from_secs(env_or("SUPERVISOR_POLL_SECS", 5)),
            join_timeout:  env_ms("SUPERVISOR_JOIN_TIMEOUT_MS", 3_000),
        }
    }
}

// ─── BrainConfig ──────────────────────────────────────────────────────────────

/// Everything the Brain needs, assembled once at startup.
#[derive(Debug, Clone)]
pub struct BrainConfig {
    pub transport:  TransportConfig,
    pub queues:     QueueConfig,
    pub risk:       RiskConfig,
    pub engine:     EngineConfig,
    pub supervisor: SupervisorConfig,
    /// `host:port` for the read-only monitor; `None` keeps it off.
    pub monitor_addr: Option<String>,
}

impl BrainConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            transport:    TransportConfig::from_env(),
            queues:       QueueConfig::from_env(),
            risk:         RiskConfig::from_env(),
            engine:       EngineConfig::from_env(),
            supervisor:   SupervisorConfig::from_env(),
            monitor_addr: std::env::var("MONITOR_BIND_ADDR").ok().filter(|v| !v.trim().is_empty()),
        };
        config.validate().context("Invalid Brain configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let risk = &self.risk;
        if !(risk.min_risk > 0.0 && risk.min_risk <= risk.max_risk && risk.max_risk.is_finite()) {
            bail!("RISK_MIN ({}) must be > 0 and <= RISK_MAX ({})", risk.min_risk, risk.max_risk);
        }
        for (name, factor) in [("RISK_WIN_FACTOR", risk.win_factor), ("RISK_LOSS_FACTOR", risk.loss_factor)] {
            if !(factor.is_finite() && factor > 0.0) {
                bail!("{name} ({factor}) must be a finite number > 0");
            }
        }
        for (name, secs) in [
            ("COOLDOWN_NORMAL_SECS", risk.normal_cooldown_secs),
            ("COOLDOWN_EMERGENCY_SECS", risk.emergency_cooldown_secs),
        ] {
            if secs > MAX_COOLDOWN_SECS {
                bail!("{name} ({secs}) must not exceed {MAX_COOLDOWN_SECS}");
            }
        }
        if risk.emergency_loss_streak == 0 {
            bail!("COOLDOWN_EMERGENCY_STREAK must be at least 1");
        }
        if self.engine.tick_history == 0 {
            bail!("TICK_HISTORY_SIZE must be at least 1");
        }
        if self.engine.heartbeat_interval.is_zero() {
            bail!("HEARTBEAT_INTERVAL_MS must be greater than 0");
        }
        if self.transport.reconnect_ivl > self.transport.reconnect_ivl_max {
            bail!("ZMQ_RECONNECT_IVL_MS must not exceed ZMQ_RECONNECT_IVL_MAX_MS");
        }
        let t = &self.transport;
        for (name, addr) in [("feeder", &t.feeder_addr), ("policy", &t.policy_addr), ("feedback", &t.feedback_addr)] {
            if !addr.contains("://") {
                bail!("{name} endpoint '{addr}' is missing a transport prefix (e.g. tcp://)");
            }
        }
        Ok(())
    }

    /// Startup banner lines, one per concern.
    pub fn log_summary(&self) {
        let t = &self.transport;
        info!(feeder = %t.feeder_addr, policy = %t.policy_addr, feedback = %t.feedback_addr, "Endpoints");
        info!(
            sub_hwm           = t.sub_hwm,
            pub_hwm           = t.pub_hwm,
            recv_timeout      = ?t.recv_timeout,
            send_timeout      = ?t.send_timeout,
            linger            = ?t.linger,
            reconnect_ivl     = ?t.reconnect_ivl,
            reconnect_ivl_max = ?t.reconnect_ivl_max,
            "Socket tuning"
        );
        info!(
            ingestion_cap = self.queues.ingestion_capacity,
            feedback_cap  = self.queues.feedback_capacity,
            "Queues (0 = unbounded)"
        );
        info!(
            min_risk        = self.risk.min_risk,
            max_risk        = self.risk.max_risk,
            normal_secs     = self.risk.normal_cooldown_secs,
            emergency_secs  = self.risk.emergency_cooldown_secs,
            emergency_after = self.risk.emergency_loss_streak,
            "Risk adaptation"
        );
        info!(
            heartbeat = ?self.engine.heartbeat_interval,
            symbol    = %self.engine.heartbeat_symbol,
            loop_idle = ?self.engine.loop_idle,
            "Strategy engine"
        );
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> BrainConfig {
    BrainConfig {
        transport: TransportConfig {
            feeder_addr:       "tcp://127.0.0.1:0".into(),
            policy_addr:       "tcp://127.0.0.1:0".into(),
            feedback_addr:     "tcp://127.0.0.1:0".into(),
            sub_hwm:           1_000,
            pub_hwm:           1_000,
            recv_timeout:      Duration::from_millis(50),
            send_timeout:      Duration::from_millis(100),
            linger:            Duration::from_millis(100),
            reconnect_ivl:     Duration::from_millis(100),
            reconnect_ivl_max: Duration::from_millis(500),
        },
        queues: QueueConfig { ingestion_capacity: 0, feedback_capacity: 0, warn_depth: 100 },
        risk:   RiskConfig::default(),
        engine: EngineConfig {
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_symbol:   "XAUUSD".into(),
            dashboard_interval: Duration::from_secs(10),
            tick_wait:          Duration::from_millis(20),
            loop_idle:          Duration::from_millis(1),
            warmup:             Duration::from_millis(10),
            tick_history:       100,
            min_signal_confidence:     0.65,
            high_confidence_threshold: 0.85,
        },
        supervisor: SupervisorConfig {
            settle_delay:  Duration::from_millis(100),
            poll_interval: Duration::from_millis(50),
            join_timeout:  Duration::from_secs(2),
        },
        monitor_addr: None,
    }
}
