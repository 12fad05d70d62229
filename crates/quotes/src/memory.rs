use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::QuoteStore;
use crate::types::{Pair, QuoteRecord};

/// In-memory quote history with the same contract as the PostgreSQL store.
///
/// The write lock is the transaction boundary: a batch insert or a cleanup
/// is applied as a whole before any other caller observes the data.
#[derive(Clone, Default)]
pub struct InMemoryQuoteStore {
    rows: Arc<RwLock<Vec<QuoteRecord>>>,
}

impl InMemoryQuoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored rows
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Number of stored rows for one pair
    pub async fn count(&self, pair: &Pair) -> usize {
        self.rows
            .read()
            .await
            .iter()
            .filter(|r| matches_pair(r, pair))
            .count()
    }

    /// Copy of every stored row in insertion order
    pub async fn records(&self) -> Vec<QuoteRecord> {
        self.rows.read().await.clone()
    }
}

fn matches_pair(record: &QuoteRecord, pair: &Pair) -> bool {
    record.base == pair.base && record.quote == pair.quote
}

/// Latest row wins; among equal timestamps the last inserted row wins.
fn most_recent<'a>(rows: impl Iterator<Item = &'a QuoteRecord>) -> Option<QuoteRecord> {
    rows.max_by_key(|r| r.timestamp).cloned()
}

#[async_trait]
impl QuoteStore for InMemoryQuoteStore {
    async fn insert(&self, record: &QuoteRecord) -> Result<(), StoreError> {
        self.rows.write().await.push(record.clone());
        Ok(())
    }

    async fn insert_batch(&self, records: &[QuoteRecord]) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        rows.extend_from_slice(records);
        Ok(records.len() as u64)
    }

    async fn latest(&self, pair: &Pair) -> Result<Option<QuoteRecord>, StoreError> {
        let rows = self.rows.read().await;
        Ok(most_recent(rows.iter().filter(|r| matches_pair(r, pair))))
    }

    async fn at(&self, pair: &Pair, at: DateTime<Utc>) -> Result<Option<QuoteRecord>, StoreError> {
        let rows = self.rows.read().await;
        Ok(most_recent(
            rows.iter()
                .filter(|r| matches_pair(r, pair) && r.timestamp <= at),
        ))
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| r.timestamp >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}
