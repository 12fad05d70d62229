//! Tradable pair discovery via the Binance REST catalog
//!
//! Fetches `GET /api/v3/exchangeInfo` once at startup and keeps spot symbols
//! that are currently trading, optionally restricted to a set of quote assets.

use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

use quotes::MarketPair;

use crate::error::DiscoveryError;

/// Binance REST API base URL
pub const BINANCE_API_URL: &str = "https://api.binance.com";

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Response from `/api/v3/exchangeInfo` (fields we use)
#[derive(Debug, Deserialize)]
pub struct ExchangeInfo {
    #[serde(default)]
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub permission_sets: Vec<Vec<String>>,
    #[serde(default)]
    pub is_spot_trading_allowed: bool,
}

impl SymbolInfo {
    fn is_spot(&self) -> bool {
        self.is_spot_trading_allowed
            || self.permissions.iter().any(|p| p == "SPOT")
            || self
                .permission_sets
                .iter()
                .any(|set| set.iter().any(|p| p == "SPOT"))
    }
}

/// Parse a comma-separated quote-asset allow-list. Empty means "all".
pub fn parse_quote_filter(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|q| q.trim().to_ascii_uppercase())
        .filter(|q| !q.is_empty())
        .collect()
}

/// Keep trading spot symbols whose quote asset passes the filter
pub fn parse_exchange_info(info: &ExchangeInfo, quote_filter: &HashSet<String>) -> Vec<MarketPair> {
    info.symbols
        .iter()
        .filter(|s| s.status == "TRADING" && s.is_spot())
        .filter(|s| {
            quote_filter.is_empty() || quote_filter.contains(&s.quote_asset.to_ascii_uppercase())
        })
        .map(|s| MarketPair::new(&s.base_asset, &s.quote_asset))
        .collect()
}

/// Client for the exchange's symbol catalog
pub struct BinanceCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceCatalog {
    pub fn new(api_base: impl Into<String>) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the catalog and return every tradable pair, in catalog order
    pub async fn list_tradable_pairs(
        &self,
        quote_filter: &HashSet<String>,
    ) -> Result<Vec<MarketPair>, DiscoveryError> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        debug!(url = %url, "Fetching exchange info");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(DiscoveryError::Status(response.status()));
        }

        let body = response.text().await?;
        let info: ExchangeInfo = serde_json::from_str(&body).map_err(|e| {
            let excerpt: String = body.chars().take(200).collect();
            DiscoveryError::Json(format!("{}: {}", e, excerpt))
        })?;

        let pairs = parse_exchange_info(&info, quote_filter);
        info!(
            listed = info.symbols.len(),
            tradable = pairs.len(),
            "Discovered tradable pairs"
        );

        if pairs.is_empty() {
            return Err(DiscoveryError::Empty);
        }
        Ok(pairs)
    }
}
