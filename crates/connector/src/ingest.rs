//! Ingestion orchestration
//!
//! One batch unit = one stream supervisor + one flusher sharing a price book.
//! Batch units are isolated: a failing feed or a panic in one never touches
//! the others.

use std::sync::Arc;

use quotes::QuoteStore;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::aggregator::PriceBook;
use crate::batcher::BatchDescriptor;
use crate::flusher::{FlushConfig, Flusher};
use crate::supervisor::{Backoff, Supervisor};
use crate::traits::TickSource;

#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    pub flush: FlushConfig,
    pub backoff: Backoff,
}

/// Run the supervisor and flusher for one batch until shutdown
pub async fn run_batch(
    batch: BatchDescriptor,
    source: Arc<dyn TickSource>,
    store: Arc<dyn QuoteStore>,
    flush_config: FlushConfig,
    backoff: Backoff,
    shutdown: watch::Receiver<bool>,
) {
    let batch = Arc::new(batch);
    let prices = Arc::new(PriceBook::new(batch.pairs().to_vec()));

    let supervisor =
        Supervisor::new(batch.clone(), source, prices.clone()).with_backoff(backoff);
    let flusher = Flusher::new(batch.id, prices, store, flush_config);

    tokio::join!(supervisor.run(shutdown.clone()), flusher.run(shutdown));
    info!(batch = batch.id, "Batch stopped");
}

/// Run every batch concurrently; returns once all of them have stopped
pub async fn run_ingestion(
    batches: Vec<BatchDescriptor>,
    source: Arc<dyn TickSource>,
    store: Arc<dyn QuoteStore>,
    config: IngestConfig,
    shutdown: watch::Receiver<bool>,
) {
    info!(batches = batches.len(), "Starting ingestion");

    let mut tasks = JoinSet::new();
    for batch in batches {
        tasks.spawn(run_batch(
            batch,
            source.clone(),
            store.clone(),
            config.flush.clone(),
            config.backoff.clone(),
            shutdown.clone(),
        ));
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Batch task failed");
        }
    }

    info!("Ingestion stopped");
}
