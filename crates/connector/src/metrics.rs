//! Prometheus metrics for quote ingestion
//!
//! Per-batch metrics for monitoring stream connections, tick flow and flushes.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_vec, register_int_gauge, register_int_gauge_vec, Encoder, IntCounterVec,
    IntGauge, IntGaugeVec, TextEncoder,
};

/// Labels used for metrics
const LABEL_BATCH: &str = "batch";
const LABEL_REASON: &str = "reason";

/// Ticks routed into a price book
static TICKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "converter_ticks_total",
        "Ticks routed into the latest-price book",
        &[LABEL_BATCH]
    )
    .expect("Failed to register ticks_total metric")
});

/// Ticks dropped before reaching the price book
static TICKS_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "converter_ticks_dropped_total",
        "Ticks dropped before reaching the latest-price book",
        &[LABEL_BATCH, LABEL_REASON]
    )
    .expect("Failed to register ticks_dropped_total metric")
});

/// Stream connection status per batch (1 = streaming, 0 = not)
static STREAM_CONNECTED: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "converter_stream_connected",
        "Stream connection status per batch (1=streaming, 0=disconnected)",
        &[LABEL_BATCH]
    )
    .expect("Failed to register stream_connected metric")
});

/// Reconnect attempts per batch
static RECONNECTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "converter_reconnects_total",
        "Backoff cycles entered per batch",
        &[LABEL_BATCH]
    )
    .expect("Failed to register reconnects_total metric")
});

/// Markets subscribed per batch
static MARKETS_SUBSCRIBED: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "converter_markets_subscribed",
        "Number of markets subscribed per batch",
        &[LABEL_BATCH]
    )
    .expect("Failed to register markets_subscribed metric")
});

/// Total number of batches
static BATCHES_TOTAL: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("converter_batches_total", "Total number of stream batches")
        .expect("Failed to register batches_total metric")
});

/// Quote rows written by flushes
static ROWS_FLUSHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "converter_rows_flushed_total",
        "Quote rows written to the store",
        &[LABEL_BATCH]
    )
    .expect("Failed to register rows_flushed_total metric")
});

/// Failed flush cycles
static FLUSH_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "converter_flush_errors_total",
        "Flush cycles that failed to write or clean up",
        &[LABEL_BATCH]
    )
    .expect("Failed to register flush_errors_total metric")
});

/// Rows removed by retention cleanup
static ROWS_DELETED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "converter_rows_deleted_total",
        "Quote rows removed by retention cleanup",
        &[LABEL_BATCH]
    )
    .expect("Failed to register rows_deleted_total metric")
});

/// Handle for recording metrics for one batch
#[derive(Clone)]
pub struct BatchMetrics {
    batch: String,
}

impl BatchMetrics {
    pub fn new(batch_id: usize) -> Self {
        Self {
            batch: batch_id.to_string(),
        }
    }

    pub fn inc_ticks(&self) {
        TICKS_TOTAL.with_label_values(&[&self.batch]).inc();
    }

    /// Record a dropped tick (`reason`: e.g. "unmapped")
    pub fn inc_dropped(&self, reason: &str) {
        TICKS_DROPPED_TOTAL
            .with_label_values(&[&self.batch, reason])
            .inc();
    }

    pub fn set_connected(&self) {
        STREAM_CONNECTED.with_label_values(&[&self.batch]).set(1);
    }

    pub fn set_disconnected(&self) {
        STREAM_CONNECTED.with_label_values(&[&self.batch]).set(0);
    }

    pub fn inc_reconnects(&self) {
        RECONNECTS_TOTAL.with_label_values(&[&self.batch]).inc();
    }

    pub fn set_markets_subscribed(&self, count: usize) {
        MARKETS_SUBSCRIBED
            .with_label_values(&[&self.batch])
            .set(count as i64);
    }

    pub fn add_rows_flushed(&self, rows: u64) {
        ROWS_FLUSHED_TOTAL
            .with_label_values(&[&self.batch])
            .inc_by(rows);
    }

    pub fn inc_flush_errors(&self) {
        FLUSH_ERRORS_TOTAL.with_label_values(&[&self.batch]).inc();
    }

    pub fn add_rows_deleted(&self, rows: u64) {
        ROWS_DELETED_TOTAL
            .with_label_values(&[&self.batch])
            .inc_by(rows);
    }
}

/// Record total number of batches
pub fn set_batches_total(count: usize) {
    BATCHES_TOTAL.set(count as i64);
}

/// Encode all registered metrics in Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
