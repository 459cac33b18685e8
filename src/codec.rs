//! # codec — MessagePack wire format
//!
//! ```text
//! Tick         → array  [1, ts_ms, symbol, bid, ask]            (≥ 5 fields)
//! TradeResult  → array  [100, ts_ms, ticket, symbol, side, ...]  (≥ 12 fields)
//! Policy       → map    {"type": "POLICY", "symbol": ..., ...}
//! ```
//!
//! Positional records are decoded through a dynamic [`rmpv::Value`] so that a
//! short record, a non-array payload or an un-coercible field surfaces as
//! [`BrainError::MalformedMessage`] instead of a serde shape error.  Fields
//! beyond the minimum are ignored.  Integers widen to floats, floats truncate
//! to integers.

use rmpv::Value;

use crate::error::BrainError;
use crate::models::tick::TICK_FIELDS;
use crate::models::trade::TRADE_RESULT_FIELDS;
use crate::models::{PolicyMessage, Side, Tick, TradeResult};

// ─── Decode ───────────────────────────────────────────────────────────────────

pub fn decode_tick(bytes: &[u8]) -> Result<Tick, BrainError> {
    let fields = read_record(bytes, TICK_FIELDS, "tick")?;
    Ok(Tick {
        msg_type:     int_at(&fields, 0, "msg_type")?,
        timestamp_ms: int_at(&fields, 1, "timestamp")?,
        symbol:       str_at(&fields, 2, "symbol")?,
        bid:          float_at(&fields, 3, "bid")?,
        ask:          float_at(&fields, 4, "ask")?,
    })
}

pub fn decode_trade_result(bytes: &[u8]) -> Result<TradeResult, BrainError> {
    let fields = read_record(bytes, TRADE_RESULT_FIELDS, "trade result")?;
    Ok(TradeResult {
        msg_type:     int_at(&fields, 0, "msg_type")?,
        timestamp_ms: int_at(&fields, 1, "timestamp")?,
        ticket:       int_at(&fields, 2, "ticket")?,
        symbol:       str_at(&fields, 3, "symbol")?,
        side:         Side::try_from(int_at(&fields, 4, "type")?)?,
        volume:       float_at(&fields, 5, "volume")?,
        open_price:   float_at(&fields, 6, "open_price")?,
        stop_loss:    float_at(&fields, 7, "sl")?,
        take_profit:  float_at(&fields, 8, "tp")?,
        profit:       float_at(&fields, 9, "profit")?,
        magic:        int_at(&fields, 10, "magic")?,
        comment:      str_at(&fields, 11, "comment")?,
    })
}

#[cfg(test)]
pub fn decode_policy(bytes: &[u8]) -> Result<PolicyMessage, BrainError> {
    rmp_serde::from_slice(bytes).map_err(|e| BrainError::malformed(format!("policy: {e}")))
}

// ─── Encode ───────────────────────────────────────────────────────────────────

/// Policies go out as maps (`to_vec_named`); the Trader looks fields up by key.
pub fn encode_policy(policy: &PolicyMessage) -> Result<Vec<u8>, BrainError> {
    rmp_serde::to_vec_named(policy).map_err(|e| BrainError::Encode(e.to_string()))
}

#[cfg(test)]
/// Feeder-side layout.
pub fn encode_tick(tick: &Tick) -> Result<Vec<u8>, BrainError> {
    rmp_serde::to_vec(&(tick.msg_type, tick.timestamp_ms, &tick.symbol, tick.bid, tick.ask))
        .map_err(|e| BrainError::Encode(e.to_string()))
}

#[cfg(test)]
/// Trader-side layout.
pub fn encode_trade_result(r: &TradeResult) -> Result<Vec<u8>, BrainError> {
    rmp_serde::to_vec(&(
        r.msg_type,
        r.timestamp_ms,
        r.ticket,
        &r.symbol,
        r.side.code(),
        r.volume,
        r.open_price,
        r.stop_loss,
        r.take_profit,
        r.profit,
        r.magic,
        &r.comment,
    ))
    .map_err(|e| BrainError::Encode(e.to_string()))
}

// ─── Positional helpers ───────────────────────────────────────────────────────

fn read_record(bytes: &[u8], min_fields: usize, what: &str) -> Result<Vec<Value>, BrainError> {
    let mut reader = bytes;
    let value = rmpv::decode::read_value(&mut reader)
        .map_err(|e| BrainError::malformed(format!("{what}: {e}")))?;

    match value {
        Value::Array(fields) if fields.len() >= min_fields => Ok(fields),
        Value::Array(fields) => Err(BrainError::malformed(format!(
            "{what}: expected at least {min_fields} fields, got {}",
            fields.len()
        ))),
        other => Err(BrainError::malformed(format!(
            "{what}: expected an array, got {}",
            kind_of(&other)
        ))),
    }
}

fn int_at(fields: &[Value], idx: usize, name: &str) -> Result<i64, BrainError> {
    match &fields[idx] {
        Value::Integer(n) => n
            .as_i64()
            .ok_or_else(|| BrainError::malformed(format!("{name}: integer out of range"))),
        Value::F32(f) => truncate(f64::from(*f), name),
        Value::F64(f) => truncate(*f, name),
        other => Err(BrainError::malformed(format!("{name}: expected integer, got {}", kind_of(other)))),
    }
}

fn truncate(f: f64, name: &str) -> Result<i64, BrainError> {
    if f.is_finite() && f.abs() < i64::MAX as f64 {
        Ok(f.trunc() as i64)
    } else {
        Err(BrainError::malformed(format!("{name}: {f} is not representable as integer")))
    }
}

fn float_at(fields: &[Value], idx: usize, name: &str) -> Result<f64, BrainError> {
    match &fields[idx] {
        Value::F64(f) => Ok(*f),
        Value::F32(f) => Ok(f64::from(*f)),
        Value::Integer(n) => n
            .as_f64()
            .ok_or_else(|| BrainError::malformed(format!("{name}: integer not convertible"))),
        other => Err(BrainError::malformed(format!("{name}: expected number, got {}", kind_of(other)))),
    }
}

fn str_at(fields: &[Value], idx: usize, name: &str) -> Result<String, BrainError> {
    match &fields[idx] {
        Value::String(s) => s
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| BrainError::malformed(format!("{name}: invalid UTF-8"))),
        Value::Binary(b) => String::from_utf8(b.clone())
            .map_err(|_| BrainError::malformed(format!("{name}: invalid UTF-8"))),
        other => Err(BrainError::malformed(format!("{name}: expected string, got {}", kind_of(other)))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Nil        => "nil",
        Value::Boolean(_) => "bool",
        Value::Integer(_) => "integer",
        Value::F32(_) | Value::F64(_) => "float",
        Value::String(_)  => "string",
        Value::Binary(_)  => "binary",
        Value::Array(_)   => "array",
        Value::Map(_)     => "map",
        Value::Ext(..)    => "ext",
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::policy::{DIRECTIONAL_MODEL, POLICY_TYPE, TELEMETRY_MODEL};
    use crate::models::trade::sample_result;
    use crate::models::{Action, DirectionalPolicy, TelemetryDebug, TelemetryPolicy};
    use std::collections::BTreeMap;

    fn pack<T: serde::Serialize>(value: &T) -> Vec<u8> {
        rmp_serde::to_vec(value).unwrap()
    }

    #[test]
    fn tick_fields_map_positionally() {
        let bytes = pack(&(1, 1_733_300_000_123i64, "XAUUSD", 2650.10, 2650.35));
        let tick = decode_tick(&bytes).unwrap();
        assert_eq!(tick.msg_type, 1);
        assert_eq!(tick.timestamp_ms, 1_733_300_000_123);
        assert_eq!(tick.symbol, "XAUUSD");
        assert_eq!(tick.bid, 2650.10);
        assert_eq!(tick.ask, 2650.35);
    }

    #[test]
    fn short_tick_is_malformed() {
        let bytes = pack(&(1, 1_733_300_000_123i64, "XAUUSD", 2650.10));
        assert!(matches!(decode_tick(&bytes), Err(BrainError::MalformedMessage(_))));
    }

    #[test]
    fn trailing_tick_fields_are_ignored() {
        let bytes = pack(&(1, 5i64, "EURUSD", 1.05, 1.0502, "spread-zone", 42));
        let tick = decode_tick(&bytes).unwrap();
        assert_eq!(tick.symbol, "EURUSD");
        assert_eq!(tick.ask, 1.0502);
    }

    #[test]
    fn non_array_payloads_are_malformed() {
        let mut map = BTreeMap::new();
        map.insert("symbol", "XAUUSD");
        assert!(matches!(decode_tick(&pack(&map)), Err(BrainError::MalformedMessage(_))));
        assert!(matches!(decode_tick(&pack(&"hello")), Err(BrainError::MalformedMessage(_))));
        assert!(matches!(decode_tick(&[0xc1]), Err(BrainError::MalformedMessage(_))));
        assert!(matches!(decode_tick(&[]), Err(BrainError::MalformedMessage(_))));
    }

    #[test]
    fn numeric_fields_are_coerced() {
        // integer prices widen, float timestamp truncates
        let bytes = pack(&(1.0, 1_733_300_000_999.7, "USDJPY", 150, 151));
        let tick = decode_tick(&bytes).unwrap();
        assert_eq!(tick.msg_type, 1);
        assert_eq!(tick.timestamp_ms, 1_733_300_000_999);
        assert_eq!(tick.bid, 150.0);
        assert_eq!(tick.ask, 151.0);
    }

    #[test]
    fn uncoercible_field_is_malformed() {
        let bytes = pack(&(1, 5i64, "XAUUSD", "not-a-price", 2650.35));
        assert!(matches!(decode_tick(&bytes), Err(BrainError::MalformedMessage(_))));
        let bytes = pack(&(1, 5i64, 77, 2650.1, 2650.35));
        assert!(matches!(decode_tick(&bytes), Err(BrainError::MalformedMessage(_))));
    }

    #[test]
    fn trade_result_decodes_all_twelve_fields() {
        let original = sample_result(987654, 15.75);
        let decoded = decode_trade_result(&encode_trade_result(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
        assert!(decoded.is_win());
    }

    #[test]
    fn trade_result_with_eleven_fields_is_malformed() {
        let bytes = pack(&(100, 1i64, 2i64, "XAUUSD", 0, 0.1, 1.0, 0.9, 1.1, -3.0, 7i64));
        assert!(matches!(decode_trade_result(&bytes), Err(BrainError::MalformedMessage(_))));
    }

    #[test]
    fn trade_result_with_unknown_side_is_malformed() {
        let bytes = pack(&(100, 1i64, 2i64, "XAUUSD", 5, 0.1, 1.0, 0.9, 1.1, -3.0, 7i64, ""));
        assert!(matches!(decode_trade_result(&bytes), Err(BrainError::MalformedMessage(_))));
    }

    #[test]
    fn directional_policy_round_trip() {
        let policy = PolicyMessage::Directional(DirectionalPolicy {
            kind:          POLICY_TYPE.into(),
            symbol:        "XAUUSD".into(),
            action:        Action::Sell,
            confidence:    0.88,
            timestamp_ms:  1_733_300_000_000,
            model_version: DIRECTIONAL_MODEL.into(),
            debug_info:    "Risk:1.10x".into(),
        });
        let decoded = decode_policy(&encode_policy(&policy).unwrap()).unwrap();
        assert_eq!(decoded, policy);
    }

    #[test]
    fn telemetry_policy_round_trip() {
        let csm: BTreeMap<String, f64> =
            [("USD", 6.5), ("EUR", 4.0), ("GBP", 5.0), ("JPY", 3.25)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
        let policy = PolicyMessage::Telemetry(TelemetryPolicy {
            kind:            POLICY_TYPE.into(),
            symbol:          "XAUUSD".into(),
            action:          Action::Hold,
            weight:          1.0,
            timestamp_ms:    1_733_300_000_000,
            model_version:   TELEMETRY_MODEL.into(),
            risk_multiplier: 0.81,
            in_cooldown:     true,
            confidence:      0.3,
            csm,
            debug_info: TelemetryDebug {
                total_trades:       4,
                win_rate:           25.0,
                total_profit:       -12.5,
                consecutive_wins:   0,
                consecutive_losses: 2,
            },
        });
        let decoded = decode_policy(&encode_policy(&policy).unwrap()).unwrap();
        assert_eq!(decoded, policy);
    }

    #[test]
    fn policy_is_a_keyed_map_on_the_wire() {
        let policy = PolicyMessage::Directional(DirectionalPolicy {
            kind:          POLICY_TYPE.into(),
            symbol:        "EURUSD".into(),
            action:        Action::Buy,
            confidence:    0.8,
            timestamp_ms:  1,
            model_version: DIRECTIONAL_MODEL.into(),
            debug_info:    "Risk:1.00x".into(),
        });
        let bytes = encode_policy(&policy).unwrap();
        let value = rmpv::decode::read_value(&mut &bytes[..]).unwrap();
        let Value::Map(entries) = value else { panic!("policy must encode as a map") };
        let keys: Vec<_> = entries.iter().filter_map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"type"));
        assert!(keys.contains(&"timestamp"));
        let action = entries.iter().find(|(k, _)| k.as_str() == Some("action")).map(|(_, v)| v);
        assert_eq!(action.and_then(Value::as_u64), Some(1));
    }
}
