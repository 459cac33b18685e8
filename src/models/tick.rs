//! # models::tick
//!
//! Defines [`Tick`], the market pulse the Feeder publishes on every quote
//! change.  On the wire it is the positional record
//! `[msg_type=1, timestamp_ms, symbol, bid, ask]`.

use serde::Serialize;

/// `msg_type` tag the Feeder puts in slot 0 of every tick record.
#[cfg(test)]
pub const MSG_TICK: i64 = 1;

/// Minimum number of positional fields a tick record must carry.
pub const TICK_FIELDS: usize = 5;

/// A single bid/ask update for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tick {
    pub msg_type:     i64,
    /// Feeder clock, milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// e.g. `"XAUUSD"`, `"EURUSD"`
    pub symbol:       String,
    pub bid:          f64,
    pub ask:          f64,
}

impl Tick {
    #[cfg(test)]
    pub fn new(symbol: impl Into<String>, bid: f64, ask: f64, timestamp_ms: i64) -> Self {
        Self {
            msg_type: MSG_TICK,
            timestamp_ms,
            symbol: symbol.into(),
            bid,
            ask,
        }
    }

    #[inline]
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    #[inline]
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}
