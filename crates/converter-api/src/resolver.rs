//! Point-in-time conversion resolver
//!
//! Resolves `amount` of `from` into `to` using the stored quote history:
//!
//! 1. Direct quote `from/to` (latest, or most recent at or before `timestamp`).
//! 2. Otherwise the inverse quote `to/from`, using `1 / price`.
//! 3. Otherwise the pair is not available.
//!
//! Requests without a timestamp mean "now" and must be answered from a quote
//! younger than the freshness window. Historical requests skip that check.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use quotes::{Pair, QuoteRecord, QuoteStore, StoreError};
use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_FRESHNESS_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub amount: f64,
    pub from: String,
    pub to: String,
    /// `None` = latest quote, subject to freshness
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    pub base: String,
    pub quote: String,
    pub rate: f64,
    pub amount_in: f64,
    pub amount_out: f64,
    /// Timestamp of the quote the rate came from
    pub timestamp: DateTime<Utc>,
    /// Rate derived from the reciprocal of the `quote/base` price
    pub inverted: bool,
}

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("amount must be a positive number")]
    InvalidAmount,

    #[error("conversion not available for {base}/{quote}")]
    PairNotAvailable { base: String, quote: String },

    #[error("inverse quote for {base}/{quote} has zero price")]
    ZeroPriceInversion { base: String, quote: String },

    #[error("latest quote is {age_secs}s old")]
    StaleQuote { age_secs: u64 },

    #[error("quote store error: {0}")]
    Store(#[from] StoreError),
}

impl ConversionError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ConversionError::InvalidAmount => "invalid_request",
            ConversionError::PairNotAvailable { .. } => "pair_not_available",
            ConversionError::ZeroPriceInversion { .. } => "invalid_quote_zero_price",
            ConversionError::StaleQuote { .. } => "quotes_outdated",
            ConversionError::Store(_) => "internal_error",
        }
    }
}

pub struct ConversionResolver {
    store: Arc<dyn QuoteStore>,
    freshness: Duration,
}

impl ConversionResolver {
    pub fn new(store: Arc<dyn QuoteStore>) -> Self {
        Self {
            store,
            freshness: Duration::from_secs(DEFAULT_FRESHNESS_SECS),
        }
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    /// Resolve a conversion as of `now`. Read-only.
    pub async fn convert(
        &self,
        request: &ConversionRequest,
        now: DateTime<Utc>,
    ) -> Result<Conversion, ConversionError> {
        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(ConversionError::InvalidAmount);
        }

        let pair = Pair::new(&request.from, &request.to);

        let (record, rate, inverted) = match self.lookup(&pair, request.timestamp).await? {
            Some(record) => {
                let rate = record.price;
                (record, rate, false)
            }
            None => match self.lookup(&pair.inverse(), request.timestamp).await? {
                Some(record) if record.price == 0.0 => {
                    return Err(ConversionError::ZeroPriceInversion {
                        base: pair.base,
                        quote: pair.quote,
                    });
                }
                Some(record) => {
                    let rate = 1.0 / record.price;
                    (record, rate, true)
                }
                None => {
                    return Err(ConversionError::PairNotAvailable {
                        base: pair.base,
                        quote: pair.quote,
                    });
                }
            },
        };

        if request.timestamp.is_none() {
            // A quote stamped in the future counts as fresh
            if let Ok(age) = (now - record.timestamp).to_std() {
                if age > self.freshness {
                    return Err(ConversionError::StaleQuote {
                        age_secs: age.as_secs(),
                    });
                }
            }
        }

        Ok(Conversion {
            base: pair.base,
            quote: pair.quote,
            rate,
            amount_in: request.amount,
            amount_out: request.amount * rate,
            timestamp: record.timestamp,
            inverted,
        })
    }

    async fn lookup(
        &self,
        pair: &Pair,
        at: Option<DateTime<Utc>>,
    ) -> Result<Option<QuoteRecord>, StoreError> {
        match at {
            Some(at) => self.store.at(pair, at).await,
            None => self.store.latest(pair).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotes::InMemoryQuoteStore;

    async fn store_with(records: &[(&str, &str, f64, DateTime<Utc>)]) -> InMemoryQuoteStore {
        let store = InMemoryQuoteStore::new();
        for (base, quote, price, ts) in records {
            store
                .insert(&QuoteRecord::new(&Pair::new(base, quote), *price, *ts))
                .await
                .unwrap();
        }
        store
    }

    fn request(amount: f64, from: &str, to: &str) -> ConversionRequest {
        ConversionRequest {
            amount,
            from: from.to_string(),
            to: to.to_string(),
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_direct_conversion() {
        let now = Utc::now();
        let store = store_with(&[("BTC", "USDT", 50000.0, now)]).await;
        let resolver = ConversionResolver::new(Arc::new(store));

        let conversion = resolver
            .convert(&request(2.0, "btc", "usdt"), now)
            .await
            .unwrap();
        assert_eq!(conversion.base, "BTC");
        assert_eq!(conversion.quote, "USDT");
        assert_eq!(conversion.rate, 50000.0);
        assert_eq!(conversion.amount_in, 2.0);
        assert_eq!(conversion.amount_out, 100000.0);
        assert_eq!(conversion.timestamp, now);
        assert!(!conversion.inverted);
    }

    #[tokio::test]
    async fn test_inverse_conversion() {
        let now = Utc::now();
        let store = store_with(&[("DOGE", "USDT", 0.2, now)]).await;
        let resolver = ConversionResolver::new(Arc::new(store));

        let conversion = resolver
            .convert(&request(10.0, "USDT", "DOGE"), now)
            .await
            .unwrap();
        assert!((conversion.rate - 5.0).abs() < 1e-9);
        assert!((conversion.amount_out - 50.0).abs() < 1e-9);
        assert_eq!(conversion.base, "USDT");
        assert_eq!(conversion.quote, "DOGE");
        assert!(conversion.inverted);
    }

    #[tokio::test]
    async fn test_direct_preferred_over_inverse() {
        let now = Utc::now();
        let store = store_with(&[("ETH", "BTC", 0.05, now), ("BTC", "ETH", 19.0, now)]).await;
        let resolver = ConversionResolver::new(Arc::new(store));

        let conversion = resolver
            .convert(&request(1.0, "BTC", "ETH"), now)
            .await
            .unwrap();
        assert_eq!(conversion.rate, 19.0);
        assert!(!conversion.inverted);
    }

    #[tokio::test]
    async fn test_stale_latest_rejected_but_historical_allowed() {
        let now = Utc::now();
        let two_minutes_ago = now - chrono::Duration::minutes(2);
        let store = store_with(&[("BTC", "USDT", 50000.0, two_minutes_ago)]).await;
        let resolver = ConversionResolver::new(Arc::new(store));

        let err = resolver
            .convert(&request(1.0, "BTC", "USDT"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::StaleQuote { age_secs: 120 }));
        assert_eq!(err.code(), "quotes_outdated");

        let historical = ConversionRequest {
            timestamp: Some(two_minutes_ago),
            ..request(1.0, "BTC", "USDT")
        };
        let conversion = resolver.convert(&historical, now).await.unwrap();
        assert_eq!(conversion.timestamp, two_minutes_ago);
    }

    #[tokio::test]
    async fn test_historical_picks_quote_at_or_before() {
        let now = Utc::now();
        let t1 = now - chrono::Duration::hours(3);
        let t2 = now - chrono::Duration::hours(2);
        let store = store_with(&[("BTC", "USDT", 40000.0, t1), ("BTC", "USDT", 45000.0, t2)]).await;
        let resolver = ConversionResolver::new(Arc::new(store));

        let between = ConversionRequest {
            timestamp: Some(t1 + chrono::Duration::minutes(30)),
            ..request(1.0, "BTC", "USDT")
        };
        assert_eq!(resolver.convert(&between, now).await.unwrap().rate, 40000.0);

        let before_history = ConversionRequest {
            timestamp: Some(t1 - chrono::Duration::minutes(1)),
            ..request(1.0, "BTC", "USDT")
        };
        assert!(matches!(
            resolver.convert(&before_history, now).await,
            Err(ConversionError::PairNotAvailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_freshness_window_is_configurable() {
        let now = Utc::now();
        let store = store_with(&[("BTC", "USDT", 50000.0, now - chrono::Duration::minutes(2))]).await;
        let resolver =
            ConversionResolver::new(Arc::new(store)).with_freshness(Duration::from_secs(300));

        assert!(resolver
            .convert(&request(1.0, "BTC", "USDT"), now)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_pair_not_available() {
        let now = Utc::now();
        let store = store_with(&[("BTC", "USDT", 50000.0, now)]).await;
        let resolver = ConversionResolver::new(Arc::new(store));

        let err = resolver
            .convert(&request(1.0, "XRP", "EUR"), now)
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            ConversionError::PairNotAvailable { base, quote } if base == "XRP" && quote == "EUR"
        ));
        assert_eq!(err.code(), "pair_not_available");
    }

    #[tokio::test]
    async fn test_zero_price_inverse_rejected() {
        let now = Utc::now();
        let store = store_with(&[("SCAM", "USDT", 0.0, now)]).await;
        let resolver = ConversionResolver::new(Arc::new(store));

        let err = resolver
            .convert(&request(1.0, "USDT", "SCAM"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::ZeroPriceInversion { .. }));
        assert_eq!(err.code(), "invalid_quote_zero_price");
    }

    #[tokio::test]
    async fn test_invalid_amount() {
        let resolver = ConversionResolver::new(Arc::new(InMemoryQuoteStore::new()));
        for amount in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                resolver.convert(&request(amount, "BTC", "USDT"), Utc::now()).await,
                Err(ConversionError::InvalidAmount)
            ));
        }
    }
}
