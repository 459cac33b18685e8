//! # risk — Feedback-driven Risk Adaptation
//!
//! Every closed trade reported by the Trader flows through [`RiskEngine::process`].
//!
//! ## Rules
//! 1. **Win**       — risk × 1.1 (cap 1.5), streak of wins grows, any cooldown is cancelled
//! 2. **Loss**      — risk × 0.9 (floor 0.5), cooldown 30 s, or 300 s once the
//!    loss streak reaches 3 (emergency). A new loss overwrites the running cooldown.
//! 3. **Breakeven** — counted as a trade, nothing else moves
//!
//! ## Ownership
//! [`RiskState`] lives inside the engine and is only mutated through `&mut
//! RiskEngine`.  The Strategy Engine task is the sole owner, so no lock is
//! needed; everyone else sees [`RiskSnapshot`] copies.
//!
//! | Variable                    | Default | Description                         |
//! |-----------------------------|---------|-------------------------------------|
//! | `RISK_MIN` / `RISK_MAX`     | 0.5/1.5 | Risk multiplier clamp               |
//! | `RISK_WIN_FACTOR`           | 1.1     | Multiplier applied on a win         |
//! | `RISK_LOSS_FACTOR`          | 0.9     | Multiplier applied on a loss        |
//! | `COOLDOWN_NORMAL_SECS`      | 30      | Cooldown after a single loss        |
//! | `COOLDOWN_EMERGENCY_SECS`   | 300     | Cooldown once the streak escalates  |
//! | `COOLDOWN_EMERGENCY_STREAK` | 3       | Losses in a row that escalate       |
//! | `HOT_STREAK_WINS`           | 3       | Wins in a row reported as hot streak|

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::env_or;
use crate::models::{Outcome, TradeResult};

// ─── Config ───────────────────────────────────────────────────────────────────

/// Longest cooldown either window may be configured to (one day).
pub const MAX_COOLDOWN_SECS: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub min_risk:                f64,
    pub max_risk:                f64,
    pub win_factor:              f64,
    pub loss_factor:             f64,
    pub normal_cooldown_secs:    u64,
    pub emergency_cooldown_secs: u64,
    /// Consecutive losses that escalate a cooldown to emergency.
    pub emergency_loss_streak:   u32,
    pub hot_streak_wins:         u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_risk:                0.5,
            max_risk:                1.5,
            win_factor:              1.1,
            loss_factor:             0.9,
            normal_cooldown_secs:    30,
            emergency_cooldown_secs: 300,
            emergency_loss_streak:   3,
            hot_streak_wins:         3,
        }
    }
}

impl RiskConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            min_risk:                env_or("RISK_MIN", d.min_risk),
            max_risk:                env_or("RISK_MAX", d.max_risk),
            win_factor:              env_or("RISK_WIN_FACTOR", d.win_factor),
            loss_factor:             env_or("RISK_LOSS_FACTOR", d.loss_factor),
            normal_cooldown_secs:    env_or("COOLDOWN_NORMAL_SECS", d.normal_cooldown_secs),
            emergency_cooldown_secs: env_or("COOLDOWN_EMERGENCY_SECS", d.emergency_cooldown_secs),
            emergency_loss_streak:   env_or("COOLDOWN_EMERGENCY_STREAK", d.emergency_loss_streak),
            hot_streak_wins:         env_or("HOT_STREAK_WINS", d.hot_streak_wins),
        }
    }
}

// ─── State ────────────────────────────────────────────────────────────────────

/// Win/loss counters, risk multiplier and cooldown window.
///
/// Invariants kept by [`RiskEngine`]:
/// * at most one of `consecutive_wins` / `consecutive_losses` is non-zero
/// * `risk_multiplier` stays inside `[min_risk, max_risk]`
/// * `total_trades = total_wins + total_losses + breakevens`
#[derive(Debug, Clone, PartialEq)]
pub struct RiskState {
    pub consecutive_wins:   u32,
    pub consecutive_losses: u32,
    pub total_trades:       u64,
    pub total_wins:         u64,
    pub total_losses:       u64,
    pub total_profit:       f64,
    pub risk_multiplier:    f64,
    /// `None` once cancelled or never started.
    pub cooldown_until:     Option<DateTime<Utc>>,
    /// May be stale until the next [`RiskEngine::is_in_cooldown`] call.
    pub in_cooldown:        bool,
}

impl Default for RiskState {
    fn default() -> Self {
        Self {
            consecutive_wins:   0,
            consecutive_losses: 0,
            total_trades:       0,
            total_wins:         0,
            total_losses:       0,
            total_profit:       0.0,
            risk_multiplier:    1.0,
            cooldown_until:     None,
            in_cooldown:        false,
        }
    }
}

// ─── Outcome of one feedback ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CooldownKind {
    Normal,
    Emergency,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackOutcome {
    Win {
        hot_streak:         bool,
        cooldown_cancelled: bool,
    },
    Loss {
        cooldown: CooldownKind,
        until:    DateTime<Utc>,
    },
    Breakeven,
}

// ─── Snapshot (for Dashboard / Monitor) ──────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskSnapshot {
    pub total_trades:       u64,
    pub total_wins:         u64,
    pub total_losses:       u64,
    pub total_profit:       f64,
    pub consecutive_wins:   u32,
    pub consecutive_losses: u32,
    /// Percent, 0–100.
    pub win_rate:           f64,
    pub risk_multiplier:    f64,
    pub in_cooldown:        bool,
    pub cooldown_until:     Option<DateTime<Utc>>,
    pub cooldown_remaining_secs: Option<f64>,
    pub confidence:         f64,
}

// ─── Risk Engine ──────────────────────────────────────────────────────────────

pub struct RiskEngine {
    config: RiskConfig,
    state:  RiskState,
    /// Last 10 s bucket in which the remaining cooldown was logged.
    last_cooldown_notice: Option<i64>,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            state: RiskState::default(),
            last_cooldown_notice: None,
        }
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn risk_multiplier(&self) -> f64 {
        self.state.risk_multiplier
    }

    // ─── Feedback ─────────────────────────────────────────────────────────────

    pub fn process(&mut self, result: &TradeResult) -> FeedbackOutcome {
        self.process_at(result, Utc::now())
    }

    pub fn process_at(&mut self, result: &TradeResult, now: DateTime<Utc>) -> FeedbackOutcome {
        self.state.total_trades += 1;

        let outcome = match result.outcome() {
            Outcome::Win  => self.apply_win(result, now),
            Outcome::Loss => self.apply_loss(result, now),
            Outcome::Breakeven => {
                info!(ticket = result.ticket, profit = result.profit, "⚪ FEEDBACK: BREAKEVEN");
                FeedbackOutcome::Breakeven
            }
        };

        let s = &self.state;
        info!(
            wins         = s.total_wins,
            losses       = s.total_losses,
            total_profit = s.total_profit,
            win_rate_pct = self.win_rate_pct(),
            risk         = s.risk_multiplier,
            "📊 Feedback stats"
        );

        outcome
    }

    fn apply_win(&mut self, result: &TradeResult, now: DateTime<Utc>) -> FeedbackOutcome {
        let s = &mut self.state;
        s.total_wins += 1;
        s.consecutive_wins += 1;
        s.consecutive_losses = 0;
        s.total_profit += result.profit;
        s.risk_multiplier = (s.risk_multiplier * self.config.win_factor)
            .clamp(self.config.min_risk, self.config.max_risk);

        // An expired window that nobody observed yet is cleared, not cancelled.
        let cooldown_cancelled =
            s.in_cooldown && s.cooldown_until.is_some_and(|until| now < until);
        s.in_cooldown = false;
        s.cooldown_until = None;
        self.last_cooldown_notice = None;
        if cooldown_cancelled {
            info!(ticket = result.ticket, "✅ COOLDOWN CANCELLED — win during cooldown");
        }

        let hot_streak = s.consecutive_wins >= self.config.hot_streak_wins;
        if hot_streak {
            info!(consecutive_wins = s.consecutive_wins, "🔥 HOT STREAK");
        }

        info!(
            ticket = result.ticket,
            symbol = %result.symbol,
            profit = result.profit,
            "💚 FEEDBACK: WIN"
        );

        FeedbackOutcome::Win { hot_streak, cooldown_cancelled }
    }

    fn apply_loss(&mut self, result: &TradeResult, now: DateTime<Utc>) -> FeedbackOutcome {
        let s = &mut self.state;
        s.total_losses += 1;
        s.consecutive_losses += 1;
        s.consecutive_wins = 0;
        s.total_profit += result.profit;
        s.risk_multiplier = (s.risk_multiplier * self.config.loss_factor)
            .clamp(self.config.min_risk, self.config.max_risk);

        let (kind, secs) = if s.consecutive_losses >= self.config.emergency_loss_streak {
            (CooldownKind::Emergency, self.config.emergency_cooldown_secs)
        } else {
            (CooldownKind::Normal, self.config.normal_cooldown_secs)
        };

        // Overwrites any running window rather than stacking on it.
        let secs = secs.min(MAX_COOLDOWN_SECS);
        let until = cooldown_deadline(now, secs);
        s.cooldown_until = Some(until);
        s.in_cooldown = true;
        self.last_cooldown_notice = None;

        match kind {
            CooldownKind::Emergency => warn!(
                consecutive_losses = s.consecutive_losses,
                pause_secs         = secs,
                "🚨 EMERGENCY COOLDOWN — trading paused"
            ),
            CooldownKind::Normal => warn!(pause_secs = secs, "⚠️ COOLDOWN ACTIVATED"),
        }

        info!(
            ticket = result.ticket,
            symbol = %result.symbol,
            loss   = result.profit,
            "💔 FEEDBACK: LOSS"
        );

        FeedbackOutcome::Loss { cooldown: kind, until }
    }

    // ─── Cooldown ─────────────────────────────────────────────────────────────

    /// The authority on cooldown.  Clears a stale flag the first time the
    /// window is observed to have passed.
    pub fn is_in_cooldown(&mut self) -> bool {
        self.is_in_cooldown_at(Utc::now())
    }

    pub fn is_in_cooldown_at(&mut self, now: DateTime<Utc>) -> bool {
        if !self.state.in_cooldown {
            return false;
        }

        let until = match self.state.cooldown_until {
            Some(until) if now < until => until,
            _ => {
                self.state.in_cooldown = false;
                self.last_cooldown_notice = None;
                info!("✅ COOLDOWN ENDED — trading resumed");
                return false;
            }
        };

        let remaining = (until - now).num_seconds();
        let bucket = remaining / 10;
        if self.last_cooldown_notice != Some(bucket) {
            self.last_cooldown_notice = Some(bucket);
            debug!(remaining_secs = remaining, "⏳ COOLDOWN");
        }
        true
    }

    /// Time left in the current window, if one is active at `now`.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self.state.cooldown_until {
            Some(until) if self.state.in_cooldown && now < until => Some(until - now),
            _ => None,
        }
    }

    // ─── Confidence ───────────────────────────────────────────────────────────

    /// Performance-based confidence in `[0, 1]`; forced to 0 during a loss streak
    /// that reached the emergency threshold.
    pub fn confidence(&self) -> f64 {
        let s = &self.state;
        if s.total_trades == 0 {
            return 0.5;
        }
        if s.consecutive_losses >= self.config.emergency_loss_streak {
            return 0.0;
        }

        let win_rate = s.total_wins as f64 / s.total_trades as f64;
        if win_rate >= 0.7 {
            0.8
        } else if win_rate >= 0.5 {
            0.5
        } else if win_rate >= 0.3 {
            0.3
        } else {
            0.1
        }
    }

    pub fn win_rate_pct(&self) -> f64 {
        let s = &self.state;
        if s.total_trades == 0 {
            0.0
        } else {
            s.total_wins as f64 / s.total_trades as f64 * 100.0
        }
    }

    pub fn snapshot(&mut self) -> RiskSnapshot {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&mut self, now: DateTime<Utc>) -> RiskSnapshot {
        let in_cooldown = self.is_in_cooldown_at(now);
        let remaining = self.cooldown_remaining(now);
        let s = &self.state;
        RiskSnapshot {
            total_trades:       s.total_trades,
            total_wins:         s.total_wins,
            total_losses:       s.total_losses,
            total_profit:       s.total_profit,
            consecutive_wins:   s.consecutive_wins,
            consecutive_losses: s.consecutive_losses,
            win_rate:           self.win_rate_pct(),
            risk_multiplier:    s.risk_multiplier,
            in_cooldown,
            cooldown_until:     if in_cooldown { s.cooldown_until } else { None },
            cooldown_remaining_secs: remaining.map(|d| d.num_milliseconds() as f64 / 1000.0),
            confidence:         self.confidence(),
        }
    }
}

/// `now + secs`, saturating instead of overflowing so a loss always opens a window.
fn cooldown_deadline(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|window| now.checked_add_signed(window))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
