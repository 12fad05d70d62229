use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::types::{Pair, QuoteRecord};

/// Storage abstraction for quote history (PostgreSQL, in-memory)
///
/// Every method is its own transaction. Concurrent callers (one flusher per
/// batch plus any number of API readers) rely on the store for isolation.
#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// Insert a single quote
    async fn insert(&self, record: &QuoteRecord) -> Result<(), StoreError>;

    /// Insert all quotes of one flush cycle atomically, returning rows written
    async fn insert_batch(&self, records: &[QuoteRecord]) -> Result<u64, StoreError>;

    /// Most recent quote for the pair, regardless of age
    async fn latest(&self, pair: &Pair) -> Result<Option<QuoteRecord>, StoreError>;

    /// Most recent quote for the pair with `timestamp <= at`
    async fn at(&self, pair: &Pair, at: DateTime<Utc>) -> Result<Option<QuoteRecord>, StoreError>;

    /// Delete every quote with `timestamp < cutoff`, returning rows deleted
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Connectivity probe for readiness checks
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
