//! # engine::strength
//!
//! Currency-strength data attached to every telemetry heartbeat.  No real
//! meter ships with the Brain; [`NeutralStrength`] stands in and the Trader
//! receives neutral scores.

use std::collections::BTreeMap;

/// Currencies always present in the `csm` map.
pub const TRACKED_CURRENCIES: [&str; 4] = ["USD", "EUR", "GBP", "JPY"];

pub const NEUTRAL_STRENGTH: f64 = 0.0;

pub trait StrengthSource: Send + Sync {
    /// Current currency → score map, or `None` when no data is available.
    fn strengths(&self) -> Option<BTreeMap<String, f64>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralStrength;

impl StrengthSource for NeutralStrength {
    fn strengths(&self) -> Option<BTreeMap<String, f64>> {
        None
    }
}

/// Build the `csm` payload: provider data merged over neutral defaults.
pub fn csm_payload(source: &dyn StrengthSource) -> BTreeMap<String, f64> {
    let mut csm: BTreeMap<String, f64> = TRACKED_CURRENCIES
        .iter()
        .map(|c| (c.to_string(), NEUTRAL_STRENGTH))
        .collect();

    if let Some(scores) = source.strengths() {
        csm.extend(scores.into_iter().filter(|(_, v)| v.is_finite()));
    }
    csm
}
