//! # events
//!
//! Defines [`BrainEvent`], everything the Brain broadcasts to monitor
//! subscribers.  Events are pre-serialised to JSON before hitting the
//! `broadcast` channel so receivers never need `Clone` on domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Action, Outcome, Side};
use crate::risk::CooldownKind;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrainEvent {
    /// A closed trade came back from the Trader.
    TradeResult {
        ticket:  i64,
        symbol:  String,
        side:    Side,
        profit:  f64,
        outcome: Outcome,
    },

    HotStreak {
        consecutive_wins: u32,
    },

    CooldownStarted {
        kind:               CooldownKind,
        until:              DateTime<Utc>,
        consecutive_losses: u32,
    },

    /// A win arrived while trading was paused.
    CooldownCancelled,

    PolicyPublished {
        symbol:     String,
        action:     Action,
        confidence: f64,
        heartbeat:  bool,
    },

    /// Periodic engine summary.
    Dashboard {
        ticks:           u64,
        policies:        u64,
        total_trades:    u64,
        total_wins:      u64,
        total_losses:    u64,
        total_profit:    f64,
        risk_multiplier: f64,
        in_cooldown:     bool,
        cooldown_remaining_secs: Option<f64>,
    },
}

impl BrainEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}
