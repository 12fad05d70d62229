use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A market identifier: base asset quoted in quote asset.
///
/// Asset codes are canonicalised to uppercase on construction, so
/// `Pair::new("btc", "usdt") == Pair::new("BTC", "USDT")`. Direction matters:
/// BTC/USDT and USDT/BTC are distinct pairs related by the reciprocal price.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pair {
    pub base: String,
    pub quote: String,
}

impl Pair {
    pub fn new(base: impl AsRef<str>, quote: impl AsRef<str>) -> Self {
        Self {
            base: canonical_asset(base.as_ref()),
            quote: canonical_asset(quote.as_ref()),
        }
    }

    /// The same market seen from the other side (quote/base)
    pub fn inverse(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

fn canonical_asset(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// A tradable market as reported by the exchange catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketPair {
    pub pair: Pair,
    /// Streaming feed identifier, lowercase concatenation (e.g. `btcusdt`)
    pub wire_symbol: String,
}

impl MarketPair {
    pub fn new(base: impl AsRef<str>, quote: impl AsRef<str>) -> Self {
        let pair = Pair::new(base, quote);
        let wire_symbol = format!("{}{}", pair.base, pair.quote).to_ascii_lowercase();
        Self { pair, wire_symbol }
    }
}

/// One persisted price observation. Rows are append-only; they are never
/// updated, only removed in bulk by retention cleanup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub base: String,
    pub quote: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl QuoteRecord {
    pub fn new(pair: &Pair, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            base: pair.base.clone(),
            quote: pair.quote.clone(),
            price,
            timestamp,
        }
    }

    pub fn pair(&self) -> Pair {
        Pair::new(&self.base, &self.quote)
    }
}
