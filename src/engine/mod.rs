//! Strategy side of the Brain: tick analysis, policy publication and the
//! loop that ties them to the risk state.

pub mod analyzer;
pub mod orchestrator;
pub mod publisher;
pub mod strength;
