//! Symbol batching
//!
//! Splits the discovered pair universe into batches no larger than the
//! per-connection stream limit. Batch `k` holds pairs `[k*M, (k+1)*M)`.

use std::collections::HashMap;

use quotes::{MarketPair, Pair};

use crate::error::BatchError;

/// Static description of one batch: its pairs, their wire symbols and the
/// reverse lookup used to route inbound ticks to price-book slots.
#[derive(Debug, Clone)]
pub struct BatchDescriptor {
    pub id: usize,
    pairs: Vec<Pair>,
    wire_symbols: Vec<String>,
    /// Uppercase wire symbol -> slot index
    lookup: HashMap<String, usize>,
}

impl BatchDescriptor {
    pub fn new(id: usize, markets: Vec<MarketPair>) -> Self {
        let mut pairs = Vec::with_capacity(markets.len());
        let mut wire_symbols = Vec::with_capacity(markets.len());
        let mut lookup = HashMap::with_capacity(markets.len());

        for (slot, market) in markets.into_iter().enumerate() {
            lookup
                .entry(market.wire_symbol.to_ascii_uppercase())
                .or_insert(slot);
            pairs.push(market.pair);
            wire_symbols.push(market.wire_symbol);
        }

        Self {
            id,
            pairs,
            wire_symbols,
            lookup,
        }
    }

    /// Slot for an inbound wire symbol (case-insensitive)
    pub fn route(&self, symbol: &str) -> Option<usize> {
        match self.lookup.get(symbol) {
            Some(slot) => Some(*slot),
            None => self.lookup.get(&symbol.to_ascii_uppercase()).copied(),
        }
    }

    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    pub fn pair(&self, slot: usize) -> Option<&Pair> {
        self.pairs.get(slot)
    }

    pub fn wire_symbols(&self) -> &[String] {
        &self.wire_symbols
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Partition `markets` into ordered batches of at most `max_per_batch`.
///
/// An empty universe is an error: there is nothing to ingest.
pub fn partition(
    markets: Vec<MarketPair>,
    max_per_batch: usize,
) -> Result<Vec<BatchDescriptor>, BatchError> {
    if max_per_batch == 0 {
        return Err(BatchError::InvalidLimit);
    }
    if markets.is_empty() {
        return Err(BatchError::NoMarkets);
    }

    let batches = markets
        .chunks(max_per_batch)
        .enumerate()
        .map(|(id, chunk)| BatchDescriptor::new(id, chunk.to_vec()))
        .collect();
    Ok(batches)
}
