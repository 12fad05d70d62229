//! converter-api: point-in-time currency conversion over HTTP

pub mod api;
pub mod resolver;
pub mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use prometheus::{IntCounterVec, Opts, Registry};
use quotes::QuoteStore;

use crate::resolver::ConversionResolver;

/// Metrics for prometheus
pub struct Metrics {
    pub registry: Registry,
    /// Conversion requests by outcome (`ok` or an error code)
    pub conversions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let conversions = IntCounterVec::new(
            Opts::new("converter_conversions_total", "Conversion requests by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(conversions.clone()))?;

        Ok(Self {
            registry,
            conversions,
        })
    }
}

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn QuoteStore>,
    pub resolver: ConversionResolver,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(store: Arc<dyn QuoteStore>, freshness: Duration) -> Result<Self, prometheus::Error> {
        Ok(Self {
            resolver: ConversionResolver::new(store.clone()).with_freshness(freshness),
            store,
            metrics: Metrics::new()?,
        })
    }
}
