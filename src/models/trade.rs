//! # models::trade
//!
//! Defines [`TradeResult`], one closed trade reported back by the Trader.
//!
//! Wire layout (12 positional fields, `msg_type = 100`):
//!
//! | idx | field        | idx | field        |
//! |-----|--------------|-----|--------------|
//! | 0   | msg_type     | 6   | open_price   |
//! | 1   | timestamp_ms | 7   | stop_loss    |
//! | 2   | ticket       | 8   | take_profit  |
//! | 3   | symbol       | 9   | profit       |
//! | 4   | side         | 10  | magic        |
//! | 5   | volume       | 11  | comment      |

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::error::BrainError;

#[cfg(test)]
pub const MSG_TRADE_RESULT: i64 = 100;

pub const TRADE_RESULT_FIELDS: usize = 12;

// ─── Side ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy  => "BUY",
            Side::Sell => "SELL",
        }
    }

    #[cfg(test)]
    pub fn code(self) -> i64 {
        match self {
            Side::Buy  => 0,
            Side::Sell => 1,
        }
    }
}

impl TryFrom<i64> for Side {
    type Error = BrainError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Side::Buy),
            1 => Ok(Side::Sell),
            other => Err(BrainError::malformed(format!("unknown trade side {other}"))),
        }
    }
}

// ─── Outcome ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Win,
    Loss,
    /// profit == 0: counted as a trade, touches no streak
    Breakeven,
}

// ─── TradeResult ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeResult {
    pub msg_type:     i64,
    pub timestamp_ms: i64,
    pub ticket:       i64,
    pub symbol:       String,
    pub side:         Side,
    pub volume:       f64,
    pub open_price:   f64,
    pub stop_loss:    f64,
    pub take_profit:  f64,
    /// Realised P&L in account currency.
    pub profit:       f64,
    pub magic:        i64,
    pub comment:      String,
}

impl TradeResult {
    #[inline]
    pub fn is_win(&self) -> bool {
        self.profit > 0.0
    }

    #[inline]
    pub fn is_loss(&self) -> bool {
        self.profit < 0.0
    }

    pub fn outcome(&self) -> Outcome {
        if self.is_win() {
            Outcome::Win
        } else if self.is_loss() {
            Outcome::Loss
        } else {
            Outcome::Breakeven
        }
    }

    /// Trader-side close time, if the timestamp is representable.
    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp_ms).single()
    }
}

#[cfg(test)]
pub(crate) fn sample_result(ticket: i64, profit: f64) -> TradeResult {
    TradeResult {
        msg_type:     MSG_TRADE_RESULT,
        timestamp_ms: 1_733_300_000_000,
        ticket,
        symbol:       "XAUUSD".into(),
        side:         Side::Buy,
        volume:       0.10,
        open_price:   2650.50,
        stop_loss:    2645.00,
        take_profit:  2660.00,
        profit,
        magic:        123456,
        comment:      "grid".into(),
    }
}
