//! Quote flusher
//!
//! Periodically persists a batch's latest-price book to the quote store.
//!
//! Two phases:
//! - `ColdStart`: poll the book every `cold_start_poll` and flush as soon as it
//!   holds any price, so quotes are queryable right after startup.
//! - `Steady`: after the first successful flush, sleep `interval` and flush
//!   every pair with a price, changed or not.
//!
//! Store failures are logged and retried on the next cycle; they never stop
//! ingestion.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use quotes::{QuoteRecord, QuoteStore};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::aggregator::PriceBook;
use crate::error::FlushError;
use crate::metrics::BatchMetrics;
use crate::shutdown::cancelled;

pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_RETENTION_DAYS: u64 = 7;
pub const DEFAULT_COLD_START_POLL_MS: u64 = 10;

#[derive(Debug, Clone)]
pub struct FlushConfig {
    /// Steady-state flush interval
    pub interval: Duration,
    /// Rows older than this are deleted after every flush
    pub retention: Duration,
    /// Poll interval while waiting for the first price
    pub cold_start_poll: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            retention: Duration::from_secs(DEFAULT_RETENTION_DAYS * 24 * 60 * 60),
            cold_start_poll: Duration::from_millis(DEFAULT_COLD_START_POLL_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPhase {
    ColdStart,
    Steady,
}

pub struct Flusher {
    batch_id: usize,
    prices: Arc<PriceBook>,
    store: Arc<dyn QuoteStore>,
    config: FlushConfig,
    phase: FlushPhase,
    metrics: BatchMetrics,
}

impl Flusher {
    pub fn new(
        batch_id: usize,
        prices: Arc<PriceBook>,
        store: Arc<dyn QuoteStore>,
        config: FlushConfig,
    ) -> Self {
        Self {
            batch_id,
            prices,
            store,
            config,
            phase: FlushPhase::ColdStart,
            metrics: BatchMetrics::new(batch_id),
        }
    }

    pub fn phase(&self) -> FlushPhase {
        self.phase
    }

    /// Write one row per priced pair, then apply retention.
    ///
    /// All rows of the cycle share one capture timestamp. Returns the number
    /// of rows written; an empty book writes nothing and skips cleanup.
    pub async fn flush_once(&self) -> Result<u64, FlushError> {
        let snapshot = self.prices.snapshot();
        if snapshot.is_empty() {
            return Ok(0);
        }

        let captured_at = Utc::now();
        let records: Vec<QuoteRecord> = snapshot
            .iter()
            .map(|(pair, price)| QuoteRecord::new(pair, *price, captured_at))
            .collect();

        let written = self
            .store
            .insert_batch(&records)
            .await
            .map_err(FlushError::Write)?;
        self.metrics.add_rows_flushed(written);

        let deleted = self
            .store
            .delete_older_than(self.cutoff())
            .await
            .map_err(FlushError::Cleanup)?;
        self.metrics.add_rows_deleted(deleted);

        debug!(
            batch = self.batch_id,
            written,
            deleted,
            "Flushed quotes"
        );
        Ok(written)
    }

    /// Flush until shutdown
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            batch = self.batch_id,
            interval_secs = self.config.interval.as_secs(),
            "Starting flusher"
        );

        loop {
            match self.phase {
                FlushPhase::ColdStart => {
                    if !self.prices.is_empty() && self.try_flush().await {
                        info!(batch = self.batch_id, "First flush done, switching to steady interval");
                        self.phase = FlushPhase::Steady;
                        continue;
                    }
                    tokio::select! {
                        _ = cancelled(&mut shutdown) => break,
                        _ = tokio::time::sleep(self.config.cold_start_poll) => {}
                    }
                }
                FlushPhase::Steady => {
                    tokio::select! {
                        _ = cancelled(&mut shutdown) => break,
                        _ = tokio::time::sleep(self.config.interval) => {}
                    }
                    self.try_flush().await;
                }
            }
        }

        info!(batch = self.batch_id, "Flusher stopped");
    }

    /// Run one flush, absorbing failures. Returns whether rows were written.
    async fn try_flush(&self) -> bool {
        match self.flush_once().await {
            Ok(written) => written > 0,
            Err(e) => {
                warn!(batch = self.batch_id, error = %e, "Quote flush failed");
                self.metrics.inc_flush_errors();
                // Cleanup runs only after a committed insert
                matches!(e, FlushError::Cleanup(_))
            }
        }
    }

    /// Retention cutoff, taken from the clock right before the delete
    fn cutoff(&self) -> DateTime<Utc> {
        let now = Utc::now();
        chrono::Duration::from_std(self.config.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
