//! # engine::publisher
//!
//! Builds policy messages from the current risk state and pushes them out
//! through a [`PolicySink`].
//!
//! * **Directional** — a BUY/SELL signal, confidence scaled by the risk
//!   multiplier (`DYN_V6_FEEDBACK`).
//! * **Heartbeat** — periodic HOLD carrying risk, cooldown, confidence,
//!   performance and currency strength for the Trader's grid
//!   (`DYN_V6_FEEDBACK_GRID`).

use std::future::Future;

use chrono::Utc;
use tracing::info;

use crate::codec::encode_policy;
use crate::engine::analyzer::Signal;
use crate::engine::strength::{csm_payload, StrengthSource};
use crate::error::BrainError;
use crate::models::policy::{DIRECTIONAL_MODEL, POLICY_TYPE, TELEMETRY_MODEL};
use crate::models::{Action, DirectionalPolicy, PolicyMessage, TelemetryDebug, TelemetryPolicy};
use crate::risk::RiskEngine;

/// Where encoded policies go.  The live sink is the PUB socket; tests use an
/// in-memory one.
pub trait PolicySink: Send {
    fn send(&mut self, payload: Vec<u8>) -> impl Future<Output = Result<(), BrainError>> + Send;
}

pub struct PolicyPublisher<S> {
    sink: S,
}

impl<S: PolicySink> PolicyPublisher<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub async fn publish_signal(
        &mut self,
        signal: &Signal,
        symbol: &str,
        risk: &RiskEngine,
    ) -> Result<DirectionalPolicy, BrainError> {
        let multiplier = risk.risk_multiplier();
        let policy = DirectionalPolicy {
            kind:          POLICY_TYPE.to_string(),
            symbol:        symbol.to_string(),
            action:        signal.direction.action(),
            confidence:    signal.confidence * multiplier,
            timestamp_ms:  Utc::now().timestamp_millis(),
            model_version: DIRECTIONAL_MODEL.to_string(),
            debug_info:    format!("Risk:{multiplier:.2}x"),
        };

        self.send(PolicyMessage::Directional(policy.clone())).await?;

        info!(
            action     = signal.direction.as_str(),
            symbol,
            confidence = policy.confidence,
            risk       = multiplier,
            "📤 POLICY"
        );
        Ok(policy)
    }

    pub async fn publish_heartbeat(
        &mut self,
        symbol: &str,
        risk: &mut RiskEngine,
        strength: &dyn StrengthSource,
    ) -> Result<TelemetryPolicy, BrainError> {
        let in_cooldown = risk.is_in_cooldown();
        let confidence = risk.confidence();
        let win_rate = risk.win_rate_pct();
        let s = risk.state();

        let policy = TelemetryPolicy {
            kind:            POLICY_TYPE.to_string(),
            symbol:          symbol.to_string(),
            action:          Action::Hold,
            weight:          1.0,
            timestamp_ms:    Utc::now().timestamp_millis(),
            model_version:   TELEMETRY_MODEL.to_string(),
            risk_multiplier: s.risk_multiplier,
            in_cooldown,
            confidence,
            csm:             csm_payload(strength),
            debug_info: TelemetryDebug {
                total_trades:       s.total_trades,
                win_rate,
                total_profit:       s.total_profit,
                consecutive_wins:   s.consecutive_wins,
                consecutive_losses: s.consecutive_losses,
            },
        };

        self.send(PolicyMessage::Telemetry(policy.clone())).await?;

        info!(
            symbol,
            risk     = policy.risk_multiplier,
            cooldown = in_cooldown,
            confidence,
            usd      = policy.csm.get("USD").copied().unwrap_or_default(),
            eur      = policy.csm.get("EUR").copied().unwrap_or_default(),
            "📤 POLICY (Grid)"
        );
        Ok(policy)
    }

    async fn send(&mut self, message: PolicyMessage) -> Result<(), BrainError> {
        let payload = encode_policy(&message)?;
        self.sink.send(payload).await
    }
}

// ─── Test sink ────────────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::memory::MemorySink;
    use super::*;
    use crate::engine::analyzer::Direction;
    use crate::engine::strength::NeutralStrength;
    use crate::models::trade::sample_result;
    use crate::risk::RiskConfig;

    #[tokio::test]
    async fn signal_confidence_is_risk_adjusted() {
        let sink = MemorySink::default();
        let mut publisher = PolicyPublisher::new(sink.clone());
        let mut risk = RiskEngine::new(RiskConfig::default());
        risk.process(&sample_result(1, 10.0));

        let signal = Signal { direction: Direction::Sell, confidence: 0.8 };
        let policy = publisher.publish_signal(&signal, "EURUSD", &risk).await.unwrap();

        assert_eq!(policy.action, Action::Sell);
        assert!((policy.confidence - 0.88).abs() < 1e-9);
        assert_eq!(policy.debug_info, "Risk:1.10x");
        assert_eq!(policy.model_version, "DYN_V6_FEEDBACK");

        let sent = sink.decoded();
        assert_eq!(sent, vec![PolicyMessage::Directional(policy)]);
    }

    #[tokio::test]
    async fn heartbeat_carries_risk_telemetry() {
        let sink = MemorySink::default();
        let mut publisher = PolicyPublisher::new(sink.clone());
        let mut risk = RiskEngine::new(RiskConfig::default());
        risk.process(&sample_result(1, 5.0));
        risk.process(&sample_result(2, -2.0));

        let policy = publisher
            .publish_heartbeat("XAUUSD", &mut risk, &NeutralStrength)
            .await
            .unwrap();

        assert_eq!(policy.action, Action::Hold);
        assert_eq!(policy.weight, 1.0);
        assert!(policy.in_cooldown);
        assert_eq!(policy.confidence, 0.5);
        assert_eq!(policy.debug_info.total_trades, 2);
        assert_eq!(policy.debug_info.win_rate, 50.0);
        assert_eq!(policy.debug_info.consecutive_losses, 1);
        assert!((policy.debug_info.total_profit - 3.0).abs() < 1e-9);

        let expected_csm: BTreeMap<String, f64> =
            ["EUR", "GBP", "JPY", "USD"].iter().map(|c| (c.to_string(), 0.0)).collect();
        assert_eq!(policy.csm, expected_csm);

        assert_eq!(sink.decoded(), vec![PolicyMessage::Telemetry(policy)]);
    }

    #[tokio::test]
    async fn sink_failure_is_returned() {
        let sink = MemorySink { fail: true, ..MemorySink::default() };
        let mut publisher = PolicyPublisher::new(sink);
        let mut risk = RiskEngine::new(RiskConfig::default());

        let err = publisher
            .publish_heartbeat("XAUUSD", &mut risk, &NeutralStrength)
            .await
            .unwrap_err();
        assert!(matches!(err, BrainError::Send(_)));
    }
}
