//! Domain models shared across the Brain's stages.

pub mod policy;
pub mod tick;
pub mod trade;

pub use policy::{Action, DirectionalPolicy, PolicyMessage, TelemetryDebug, TelemetryPolicy};
pub use tick::Tick;
pub use trade::{Outcome, Side, TradeResult};
