//! # stages::feedback
//!
//! **Feedback Listener** — PULL socket bound on the feedback endpoint.  The
//! Trader pushes one 12-field record per closed trade; decoded results go to
//! `feedback_queue` for the Strategy Engine's risk adaptation.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use zeromq::PullSocket;

use crate::codec::decode_trade_result;
use crate::config::TransportConfig;
use crate::error::BrainError;
use crate::models::{Outcome, TradeResult};
use crate::queue::StageQueue;
use crate::shutdown::ShutdownSignal;
use crate::stages::receive_loop;
use crate::state::{SharedState, StageStats};
use crate::transport::{bind_pull, close_socket};

const STAGE: &str = "feedback";

pub struct FeedbackListener {
    socket:       PullSocket,
    endpoint:     String,
    queue:        Arc<StageQueue<TradeResult>>,
    stats:        Arc<StageStats>,
    recv_timeout: Duration,
    linger:       Duration,
}

impl FeedbackListener {
    pub async fn bind(transport: &TransportConfig, shared: &SharedState) -> Result<Self, BrainError> {
        let (socket, endpoint) = bind_pull(&transport.feedback_addr).await?;
        info!(%endpoint, "📬 Feedback listener bound (PULL)");
        Ok(Self {
            socket,
            endpoint,
            queue:        shared.feedback_queue.clone(),
            stats:        shared.feedback_stats.clone(),
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
            handle_payload(bytes, &queue)
        })
        .await;

        close_socket(self.socket, self.linger, STAGE).await;
        let counts = stats.snapshot();
        info!(
            received = counts.received,
            errors   = counts.errors,
            dropped  = counts.dropped,
            "🛑 Feedback listener stopped"
        );
    }
}

fn handle_payload(bytes: &[u8], queue: &StageQueue<TradeResult>) -> Result<(), BrainError> {
    let result = decode_trade_result(bytes)?;
    log_trade(&result);
    queue.push(result)
}

fn log_trade(r: &TradeResult) {
    let label = match r.outcome() {
        Outcome::Win       => "💰 TRADE RESULT: WIN",
        Outcome::Loss      => "📉 TRADE RESULT: LOSS",
        Outcome::Breakeven => "⚪ TRADE RESULT: BREAKEVEN",
    };
    info!(
        ticket  = r.ticket,
        symbol  = %r.symbol,
        side    = r.side.as_str(),
        volume  = r.volume,
        open    = r.open_price,
        sl      = r.stop_loss,
        tp      = r.take_profit,
        profit  = r.profit,
        magic   = r.magic,
        comment = %r.comment,
        closed_at = ?r.closed_at(),
        "{label}"
    );
}

/// Task entry point: bind, then receive until shutdown.
pub async fn run_feedback_listener(
    transport: TransportConfig,
    shared: SharedState,
    shutdown: ShutdownSignal,
) -> Result<(), BrainError> {
    let listener = FeedbackListener::bind(&transport, &shared).await?;
    listener.run(shutdown).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_trade_result;
    use crate::config::test_config;
    use crate::models::trade::sample_result;
    use crate::state::build_state;
    use zeromq::{PushSocket, Socket, SocketSend, ZmqMessage};

    #[test]
    fn short_record_is_rejected() {
        let queue = StageQueue::new("feedback", 0);
        let bytes = rmp_serde::to_vec(&(100, 1i64, 2i64, "XAUUSD")).unwrap();

        assert!(matches!(
            handle_payload(&bytes, &queue),
            Err(BrainError::MalformedMessage(_))
        ));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn pushed_results_reach_the_queue() {
        let config = test_config();
        let (shared, _risk_tx) = build_state(&config.queues);
        let shutdown = ShutdownSignal::new();

        let listener = FeedbackListener::bind(&config.transport, &shared).await.unwrap();
        let endpoint = listener.endpoint().to_string();
        let task = tokio::spawn(listener.run(shutdown.clone()));

        let mut trader = PushSocket::new();
        trader.connect(&endpoint).await.unwrap();

        for (ticket, profit) in [(1, 15.75), (2, -10.0), (3, 0.0)] {
            let bytes = encode_trade_result(&sample_result(ticket, profit)).unwrap();
            trader.send(ZmqMessage::from(bytes)).await.unwrap();
        }

        let mut tickets = Vec::new();
        while tickets.len() < 3 {
            let result = shared
                .feedback_queue
                .pop_timeout(Duration::from_secs(2))
                .await
                .expect("result delivered");
            tickets.push((result.ticket, result.outcome()));
        }
        assert_eq!(
            tickets,
            vec![(1, Outcome::Win), (2, Outcome::Loss), (3, Outcome::Breakeven)]
        );
        assert_eq!(shared.feedback_stats.snapshot().received, 3);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }
}
