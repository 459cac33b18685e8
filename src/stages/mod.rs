//! # stages
//!
//! The two receiving stages.  Each owns one bound socket, decodes what
//! arrives and hands the record to the Strategy Engine through a
//! [`StageQueue`](crate::queue::StageQueue).  Neither stage ever blocks on
//! its queue, and a bad payload only costs a counter bump.

pub mod feedback;
pub mod ingestion;

use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::warn;
use zeromq::SocketRecv;

use crate::error::BrainError;
use crate::shutdown::ShutdownSignal;
use crate::state::StageStats;
use crate::transport::{recv_within, Received};

/// Pause after a socket error so a broken socket cannot spin the loop.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Receive until shutdown, passing every payload to `handle`.
/// A rejected payload is counted here and the loop moves on.
pub(crate) async fn receive_loop<S, F>(
    socket: &mut S,
    recv_timeout: Duration,
    shutdown: &ShutdownSignal,
    stats: &StageStats,
    stage: &'static str,
    mut handle: F,
) where
    S: SocketRecv,
    F: FnMut(&[u8]) -> Result<(), BrainError>,
{
    while !shutdown.is_triggered() {
        match recv_within(socket, recv_timeout).await {
            Received::Idle => continue,
            Received::Payload(bytes) => {
                stats.received.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = handle(&bytes) {
                    record_failure(stats, stage, &e);
                }
            }
            Received::Failed(reason) => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(stage, %reason, "Receive failed");
                shutdown.sleep(RECV_ERROR_BACKOFF).await;
            }
        }
    }
}

/// Count a rejected record against `stats`.
pub(crate) fn record_failure(stats: &StageStats, stage: &'static str, err: &BrainError) {
    stats.errors.fetch_add(1, Ordering::Relaxed);
    match err {
        BrainError::QueueFull(queue) => {
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(stage, queue, "Queue full — message dropped");
        }
        other => warn!(stage, error = %other, "Message discarded"),
    }
}
