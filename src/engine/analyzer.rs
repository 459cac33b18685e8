//! # engine::analyzer
//!
//! Per-tick market analysis.  [`MarketAnalyzer`] keeps the recent tick
//! window and hands it to a pluggable [`SignalGenerator`]; the shipped
//! generator is [`NoSignal`], so the Brain currently only heartbeats.

use std::collections::VecDeque;

use tracing::debug;

use crate::models::{Action, Tick};

// ─── Signal ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn action(self) -> Action {
        match self {
            Direction::Buy  => Action::Buy,
            Direction::Sell => Action::Sell,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Buy  => "BUY",
            Direction::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal {
    pub direction:  Direction,
    /// Base confidence before the risk multiplier is applied.
    pub confidence: f64,
}

// ─── Generator seam ───────────────────────────────────────────────────────────

/// Strategy logic plugged into the analyzer.  `history` already contains
/// `tick` as its newest entry.
pub trait SignalGenerator: Send {
    fn evaluate(&mut self, tick: &Tick, history: &VecDeque<Tick>) -> Option<Signal>;
}

/// Reference generator: never signals.
#[derive(Debug, Default)]
pub struct NoSignal;

impl SignalGenerator for NoSignal {
    fn evaluate(&mut self, _tick: &Tick, _history: &VecDeque<Tick>) -> Option<Signal> {
        None
    }
}

// ─── Analyzer ─────────────────────────────────────────────────────────────────

pub struct MarketAnalyzer {
    history:   VecDeque<Tick>,
    capacity:  usize,
    generator: Box<dyn SignalGenerator>,
}

impl MarketAnalyzer {
    pub fn new(capacity: usize, generator: Box<dyn SignalGenerator>) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            generator,
        }
    }

    pub fn with_no_signal(capacity: usize) -> Self {
        Self::new(capacity, Box::new(NoSignal))
    }

    /// Record `tick`, then ask the generator for a signal unless trading is
    /// paused.  During cooldown the generator is not consulted at all.
    pub fn analyze(&mut self, tick: &Tick, in_cooldown: bool) -> Option<Signal> {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(tick.clone());

        if in_cooldown {
            debug!(symbol = %tick.symbol, mid = tick.mid(), "Cooldown active, analysis skipped");
            return None;
        }

        self.generator.evaluate(tick, &self.history)
    }

    #[cfg(test)]
    pub fn history(&self) -> &VecDeque<Tick> {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts calls and signals BUY with a fixed confidence.
    struct Counting {
        calls:      Arc<AtomicUsize>,
        confidence: f64,
    }

    impl SignalGenerator for Counting {
        fn evaluate(&mut self, _tick: &Tick, _history: &VecDeque<Tick>) -> Option<Signal> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(Signal { direction: Direction::Buy, confidence: self.confidence })
        }
    }

    fn tick(ts: i64) -> Tick {
        Tick::new("XAUUSD", 2000.0 + ts as f64, 2000.5 + ts as f64, ts)
    }

    #[test]
    fn reference_generator_never_signals() {
        let mut analyzer = MarketAnalyzer::with_no_signal(100);
        for ts in 0..10 {
            assert_eq!(analyzer.analyze(&tick(ts), false), None);
        }
        assert_eq!(analyzer.history().len(), 10);
    }

    #[test]
    fn history_evicts_oldest_first() {
        let mut analyzer = MarketAnalyzer::with_no_signal(3);
        for ts in 0..5 {
            analyzer.analyze(&tick(ts), false);
        }
        let kept: Vec<i64> = analyzer.history().iter().map(|t| t.timestamp_ms).collect();
        assert_eq!(kept, vec![2, 3, 4]);
    }

    #[test]
    fn cooldown_skips_generator() {
        let calls = Arc::new(AtomicUsize::new(0));
        let generator = Counting { calls: calls.clone(), confidence: 0.9 };
        let mut analyzer = MarketAnalyzer::new(100, Box::new(generator));

        assert_eq!(analyzer.analyze(&tick(1), true), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let signal = analyzer.analyze(&tick(2), false).expect("signal");
        assert_eq!(signal.direction, Direction::Buy);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn direction_maps_to_policy_action() {
        assert_eq!(Direction::Buy.action(), Action::Buy);
        assert_eq!(Direction::Sell.action(), Action::Sell);
    }
}
