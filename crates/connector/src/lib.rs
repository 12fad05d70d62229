//! converter-connector: streaming quote ingestion
//!
//! Partitions the tradable-pair universe into batches, keeps one combined
//! ticker stream alive per batch, folds ticks into a latest-price book and
//! periodically persists the book to the quote store.

pub mod aggregator;
pub mod batcher;
pub mod discovery;
pub mod error;
pub mod flusher;
pub mod ingest;
pub mod messages;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod supervisor;
pub mod traits;
pub mod websocket;

#[cfg(test)]
mod test_support;

pub use aggregator::PriceBook;
pub use batcher::{partition, BatchDescriptor};
pub use discovery::BinanceCatalog;
pub use error::{BatchError, ConnectorError, DiscoveryError, FlushError};
pub use flusher::{FlushConfig, FlushPhase, Flusher};
pub use ingest::{run_batch, run_ingestion, IngestConfig};
pub use messages::Tick;
pub use server::{create_router, run_server, ServerState};
pub use supervisor::{Backoff, Supervisor, SupervisorState};
pub use traits::{TickSource, TickStream};
pub use websocket::BinanceStream;
