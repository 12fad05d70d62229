//! Binance ticker stream messages
//!
//! Combined-stream frames wrap the ticker payload:
//! `{"stream":"btcusdt@ticker","data":{"e":"24hrTicker","s":"BTCUSDT","c":"50000.01",...}}`
//! Raw-stream frames carry the payload directly. Only `s` (symbol) and `c`
//! (last price) are used.

use serde::Deserialize;
use serde_json::Value;

/// A decoded price update
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    /// Wire symbol as sent by the feed (uppercase, e.g. `BTCUSDT`)
    pub symbol: String,
    pub price: f64,
}

#[derive(Debug, Deserialize)]
struct TickerPayload {
    #[serde(rename = "s", default)]
    symbol: Option<String>,
    #[serde(rename = "c", default)]
    last_price: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamFrame {
    Combined { data: TickerPayload },
    Raw(TickerPayload),
}

/// Decode one text frame into a tick.
///
/// Returns `None` for anything that is not a usable price update: control
/// frames, subscription acks, payloads missing `s` or `c`, and prices that do
/// not parse to a finite number.
pub fn decode_tick(text: &str) -> Option<Tick> {
    let frame: StreamFrame = serde_json::from_str(text).ok()?;
    let payload = match frame {
        StreamFrame::Combined { data } => data,
        StreamFrame::Raw(payload) => payload,
    };

    let symbol = payload.symbol.filter(|s| !s.is_empty())?;
    let price = match payload.last_price? {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    if !price.is_finite() {
        return None;
    }

    Some(Tick { symbol, price })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_combined_frame() {
        let text = r#"{"stream":"btcusdt@ticker","data":{"e":"24hrTicker","s":"BTCUSDT","c":"50000.01","v":"123.4"}}"#;
        let tick = decode_tick(text).unwrap();
        assert_eq!(tick.symbol, "BTCUSDT");
        assert_eq!(tick.price, 50000.01);
    }

    #[test]
    fn test_decode_raw_frame() {
        let tick = decode_tick(r#"{"s":"ETHUSDT","c":"1800.50"}"#).unwrap();
        assert_eq!(tick.symbol, "ETHUSDT");
        assert_eq!(tick.price, 1800.5);
    }

    #[test]
    fn test_decode_numeric_price() {
        let tick = decode_tick(r#"{"s":"DOGEUSDT","c":0.2}"#).unwrap();
        assert_eq!(tick.price, 0.2);
    }

    #[test]
    fn test_skip_missing_fields() {
        assert!(decode_tick(r#"{"s":"BTCUSDT"}"#).is_none());
        assert!(decode_tick(r#"{"c":"1.0"}"#).is_none());
        assert!(decode_tick(r#"{"stream":"btcusdt@ticker","data":{"s":"","c":"1.0"}}"#).is_none());
    }

    #[test]
    fn test_skip_control_frames() {
        assert!(decode_tick(r#"{"result":null,"id":1}"#).is_none());
        assert!(decode_tick("not json").is_none());
        assert!(decode_tick("[1,2,3]").is_none());
    }

    #[test]
    fn test_skip_bad_prices() {
        assert!(decode_tick(r#"{"s":"BTCUSDT","c":"abc"}"#).is_none());
        assert!(decode_tick(r#"{"s":"BTCUSDT","c":"NaN"}"#).is_none());
        assert!(decode_tick(r#"{"s":"BTCUSDT","c":"inf"}"#).is_none());
        assert!(decode_tick(r#"{"s":"BTCUSDT","c":true}"#).is_none());
    }
}
