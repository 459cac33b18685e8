//! # transport
//!
//! Thin helpers over the `zeromq` sockets the stages own.  All three are
//! bound by the Brain; the Feeder and Trader connect to them.
//!
//! Timeouts are applied here with `tokio::time::timeout` so every socket
//! operation a stage awaits is bounded.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};
use zeromq::{PubSocket, PullSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use crate::engine::publisher::PolicySink;
use crate::error::BrainError;

// ─── Bind ─────────────────────────────────────────────────────────────────────

/// SUB socket bound to `addr`, subscribed to every topic.
/// Returns the resolved endpoint (port 0 becomes the real port).
pub async fn bind_sub(addr: &str) -> Result<(SubSocket, String), BrainError> {
    let mut socket = SubSocket::new();
    let endpoint = socket.bind(addr).await.map_err(|e| BrainError::transport(addr, e))?;
    socket.subscribe("").await.map_err(|e| BrainError::transport(addr, e))?;
    Ok((socket, endpoint.to_string()))
}

pub async fn bind_pull(addr: &str) -> Result<(PullSocket, String), BrainError> {
    let mut socket = PullSocket::new();
    let endpoint = socket.bind(addr).await.map_err(|e| BrainError::transport(addr, e))?;
    Ok((socket, endpoint.to_string()))
}

pub async fn bind_pub(addr: &str) -> Result<(PubSocket, String), BrainError> {
    let mut socket = PubSocket::new();
    let endpoint = socket.bind(addr).await.map_err(|e| BrainError::transport(addr, e))?;
    Ok((socket, endpoint.to_string()))
}

// ─── Receive ──────────────────────────────────────────────────────────────────

pub enum Received {
    Payload(Vec<u8>),
    /// Nothing arrived within the receive timeout.
    Idle,
    Failed(String),
}

/// Wait at most `wait` for one message and return its first frame.
pub async fn recv_within<S: SocketRecv>(socket: &mut S, wait: Duration) -> Received {
    match timeout(wait, socket.recv()).await {
        Err(_) => Received::Idle,
        Ok(Err(e)) => Received::Failed(e.to_string()),
        Ok(Ok(message)) => match message.get(0) {
            Some(frame) => Received::Payload(frame.to_vec()),
            None => Received::Failed("empty message".into()),
        },
    }
}

// ─── Close ────────────────────────────────────────────────────────────────────

/// Close `socket`, giving pending traffic at most `linger` to flush.
pub async fn close_socket<S: Socket>(socket: S, linger: Duration, name: &str) {
    match timeout(linger, socket.close()).await {
        Ok(result) => debug!(socket = name, ?result, "Socket closed"),
        Err(_) => warn!(socket = name, linger = ?linger, "Socket close exceeded linger — abandoned"),
    }
}

// ─── Policy sink ──────────────────────────────────────────────────────────────

/// The live policy stream: a bound PUB socket with a bounded send.
pub struct ZmqPolicySink {
    socket:       PubSocket,
    send_timeout: Duration,
}

impl ZmqPolicySink {
    pub fn new(socket: PubSocket, send_timeout: Duration) -> Self {
        Self { socket, send_timeout }
    }

    pub async fn close(self, linger: Duration) {
        close_socket(self.socket, linger, "policy").await;
    }
}

impl PolicySink for ZmqPolicySink {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), BrainError> {
        match timeout(self.send_timeout, self.socket.send(ZmqMessage::from(payload))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BrainError::Send(e.to_string())),
            Err(_) => Err(BrainError::Send(format!("timed out after {:?}", self.send_timeout))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ephemeral_port_is_resolved() {
        let (socket, endpoint) = bind_pull("tcp://127.0.0.1:0").await.unwrap();
        assert!(endpoint.starts_with("tcp://127.0.0.1:"));
        assert!(!endpoint.ends_with(":0"));
        close_socket(socket, Duration::from_millis(100), "test").await;
    }

    #[tokio::test]
    async fn second_bind_on_same_port_fails() {
        let (first, endpoint) = bind_pub("tcp://127.0.0.1:0").await.unwrap();
        let err = bind_pub(&endpoint).await.err().expect("bind conflict");
        assert!(matches!(err, BrainError::TransportSetup { .. }));
        close_socket(first, Duration::from_millis(100), "test").await;
    }

    #[tokio::test]
    async fn idle_socket_times_out() {
        let (mut socket, _) = bind_pull("tcp://127.0.0.1:0").await.unwrap();
        let received = recv_within(&mut socket, Duration::from_millis(30)).await;
        assert!(matches!(received, Received::Idle));
    }
}
