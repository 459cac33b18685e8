//! # error
//!
//! Centralised error type for the Brain's stages.
//!
//! Every stage returns `Result<_, BrainError>`.  None of these variants is
//! allowed to cross a stage boundary: a stage either recovers locally (drops
//! the message, bumps a counter) or exits on its own and lets the Supervisor
//! observe it as dead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrainError {
    /// Binding a socket endpoint failed. Fatal to the stage that owns it.
    #[error("Transport setup failed on {endpoint}: {reason}")]
    TransportSetup { endpoint: String, reason: String },

    /// Payload could not be decoded into the expected record.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A bounded stage queue rejected the item (never blocks the producer).
    #[error("Queue '{0}' is full")]
    QueueFull(&'static str),

    /// Outbound value could not be serialised.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Socket send failed or timed out.
    #[error("Send failed: {0}")]
    Send(String),
}

impl BrainError {
    pub fn transport(endpoint: &str, reason: impl std::fmt::Display) -> Self {
        Self::TransportSetup {
            endpoint: endpoint.to_string(),
            reason:   reason.to_string(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage(reason.into())
    }
}
