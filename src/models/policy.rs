//! # models::policy
//!
//! Outbound policy messages for the Trader.  Unlike ticks and trade results
//! these travel as **keyed maps**, so field names below are wire names.
//!
//! Two shapes share `"type": "POLICY"`:
//! * [`DirectionalPolicy`] — a BUY/SELL call with risk-adjusted confidence
//! * [`TelemetryPolicy`]   — periodic HOLD heartbeat carrying risk, cooldown,
//!   confidence and currency-strength data for the grid logic

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::BrainError;

pub const POLICY_TYPE: &str = "POLICY";
pub const DIRECTIONAL_MODEL: &str = "DYN_V6_FEEDBACK";
pub const TELEMETRY_MODEL: &str = "DYN_V6_FEEDBACK_GRID";

// ─── Action ───────────────────────────────────────────────────────────────────

/// 0 = HOLD, 1 = BUY, 2 = SELL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Action {
    Hold,
    Buy,
    Sell,
}

impl From<Action> for u8 {
    fn from(action: Action) -> u8 {
        match action {
            Action::Hold => 0,
            Action::Buy  => 1,
            Action::Sell => 2,
        }
    }
}

impl TryFrom<u8> for Action {
    type Error = BrainError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Action::Hold),
            1 => Ok(Action::Buy),
            2 => Ok(Action::Sell),
            other => Err(BrainError::malformed(format!("unknown policy action {other}"))),
        }
    }
}

// ─── Directional ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionalPolicy {
    #[serde(rename = "type")]
    pub kind:          String,
    pub symbol:        String,
    pub action:        Action,
    /// Signal confidence × risk multiplier.
    pub confidence:    f64,
    #[serde(rename = "timestamp")]
    pub timestamp_ms:  i64,
    pub model_version: String,
    /// e.g. `"Risk:1.10x"`
    pub debug_info:    String,
}

// ─── Telemetry / Heartbeat ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryDebug {
    pub total_trades:       u64,
    /// Percent, 0–100.
    pub win_rate:           f64,
    pub total_profit:       f64,
    pub consecutive_wins:   u32,
    pub consecutive_losses: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPolicy {
    #[serde(rename = "type")]
    pub kind:            String,
    pub symbol:          String,
    /// Always HOLD; the grid on the Trader side decides.
    pub action:          Action,
    pub weight:          f64,
    #[serde(rename = "timestamp")]
    pub timestamp_ms:    i64,
    pub model_version:   String,
    pub risk_multiplier: f64,
    #[serde(rename = "is_in_cooldown")]
    pub in_cooldown:     bool,
    pub confidence:      f64,
    /// Currency → strength score.
    pub csm:             BTreeMap<String, f64>,
    pub debug_info:      TelemetryDebug,
}

// ─── PolicyMessage ────────────────────────────────────────────────────────────

/// Either policy shape.  Untagged: the telemetry variant is tried first
/// because it is the strict superset of required keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyMessage {
    Telemetry(TelemetryPolicy),
    Directional(DirectionalPolicy),
}

impl PolicyMessage {
    #[cfg(test)]
    pub fn symbol(&self) -> &str {
        match self {
            PolicyMessage::Telemetry(p)   => &p.symbol,
            PolicyMessage::Directional(p) => &p.symbol,
        }
    }

    #[cfg(test)]
    pub fn action(&self) -> Action {
        match self {
            PolicyMessage::Telemetry(p)   => p.action,
            PolicyMessage::Directional(p) => p.action,
        }
    }
}

impl From<DirectionalPolicy> for PolicyMessage {
    fn from(p: DirectionalPolicy) -> Self {
        PolicyMessage::Directional(p)
    }
}

impl From<TelemetryPolicy> for PolicyMessage {
    fn from(p: TelemetryPolicy) -> Self {
        PolicyMessage::Telemetry(p)
    }
}
