//! # stages::ingestion
//!
//! **Tick Ingestion** — SUB socket bound on the feeder endpoint, every topic
//! subscribed.  Decoded ticks go to `ingestion_queue`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use zeromq::SubSocket;

use crate::codec::decode_tick;
use crate::config::TransportConfig;
use crate::error::BrainError;
use crate::models::Tick;
use crate::queue::StageQueue;
use crate::shutdown::ShutdownSignal;
use crate::stages::receive_loop;
use crate::state::{SharedState, StageStats};
use crate::transport::{bind_sub, close_socket};

const STAGE: &str = "ingestion";

/// Progress is logged once per this many ticks.
const PROGRESS_EVERY: u64 = 100;

pub struct IngestionStage {
    socket:       SubSocket,
    endpoint:     String,
    queue:        Arc<StageQueue<Tick>>,
    stats:        Arc<StageStats>,
    recv_timeout: Duration,
    linger:       Duration,
}

impl IngestionStage {
    pub async fn bind(transport: &TransportConfig, shared: &SharedState) -> Result<Self, BrainError> {
        let (socket, endpoint) = bind_sub(&transport.feeder_addr).await?;
        info!(%endpoint, "📥 Tick ingestion bound (SUB, all topics)");
        Ok(Self {
            socket,
            endpoint,
            queue:        shared.ingestion_queue.clone(),
            stats:        shared.ingestion_stats.clone(),
            recv_timeout: transport.recv_timeout,
            linger:       transport.linger,
        })
    }

    #[cfg(test)]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn run(mut self, shutdown: ShutdownSignal) {
        let queue = self.queue.clone();
        let stats = self.stats.clone();

        receive_loop(&mut self.socket, self.recv_timeout, &shutdown, &stats, STAGE, |bytes| {
            handle_payload(bytes, &queue, &stats)
        })
        .await;

        close_socket(self.socket, self.linger, STAGE).await;
        let counts = stats.snapshot();
        info!(
            received  = counts.received,
            errors    = counts.errors,
            dropped   = counts.dropped,
            remaining = queue.len(),
            "🛑 Tick ingestion stopped"
        );
    }
}

fn handle_payload(bytes: &[u8], queue: &StageQueue<Tick>, stats: &StageStats) -> Result<(), BrainError> {
    let tick = decode_tick(bytes)?;
    debug!(symbol = %tick.symbol, bid = tick.bid, ask = tick.ask, spread = tick.spread(), "Tick");
    queue.push(tick)?;

    let received = stats.received.load(Ordering::Relaxed);
    if received % PROGRESS_EVERY == 0 {
        info!(received, queue_depth = queue.len(), "📈 Ticks ingested");
    }
    Ok(())
}

/// Task entry point: bind, then receive until shutdown.
pub async fn run_ingestion(
    transport: TransportConfig,
    shared: SharedState,
    shutdown: ShutdownSignal,
) -> Result<(), BrainError> {
    let stage = IngestionStage::bind(&transport, &shared).await?;
    stage.run(shutdown).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_tick;
    use crate::config::test_config;
    use crate::state::build_state;
    use zeromq::{PubSocket, Socket, SocketSend, ZmqMessage};

    #[test]
    fn malformed_payload_is_rejected() {
        let queue = StageQueue::new("ingestion", 0);
        let stats = StageStats::default();

        let bytes = rmp_serde::to_vec(&(1, 1_700_000_000_000i64, "XAUUSD", 2030.1)).unwrap();
        assert!(matches!(
            handle_payload(&bytes, &queue, &stats),
            Err(BrainError::MalformedMessage(_))
        ));
        assert!(handle_payload(b"\xc1", &queue, &stats).is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let queue = StageQueue::new("ingestion", 1);
        let stats = StageStats::default();
        let bytes = encode_tick(&Tick::new("XAUUSD", 2030.1, 2030.3, 1)).unwrap();

        handle_payload(&bytes, &queue, &stats).unwrap();
        let err = handle_payload(&bytes, &queue, &stats).unwrap_err();

        assert!(matches!(err, BrainError::QueueFull("ingestion")));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn ticks_flow_from_feeder_to_queue_in_order() {
        let config = test_config();
        let (shared, _risk_tx) = build_state(&config.queues);
        let shutdown = ShutdownSignal::new();

        let stage = IngestionStage::bind(&config.transport, &shared).await.unwrap();
        let endpoint = stage.endpoint().to_string();
        let task = tokio::spawn(stage.run(shutdown.clone()));

        let mut feeder = PubSocket::new();
        feeder.connect(&endpoint).await.unwrap();

        // PUB drops until the subscription has propagated; probe first.
        let probe = encode_tick(&Tick::new("PROBE", 1.0, 1.0, 0)).unwrap();
        let mut first = None;
        for _ in 0..100 {
            feeder.send(ZmqMessage::from(probe.clone())).await.unwrap();
            first = shared.ingestion_queue.pop_timeout(Duration::from_millis(50)).await;
            if first.is_some() {
                break;
            }
        }
        assert_eq!(first.expect("subscription established").symbol, "PROBE");
        tokio::time::sleep(Duration::from_millis(100)).await;
        shared.ingestion_queue.drain();

        for ts in 1..=5 {
            let bytes = encode_tick(&Tick::new("XAUUSD", 2030.0 + ts as f64, 2030.5, ts)).unwrap();
            feeder.send(ZmqMessage::from(bytes)).await.unwrap();
        }
        feeder.send(ZmqMessage::from(b"garbage".to_vec())).await.unwrap();

        let mut seen = Vec::new();
        while seen.len() < 5 {
            let tick = shared
                .ingestion_queue
                .pop_timeout(Duration::from_secs(2))
                .await
                .expect("tick delivered");
            seen.push(tick.timestamp_ms);
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(shared.ingestion_stats.snapshot().errors >= 1);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }
}
