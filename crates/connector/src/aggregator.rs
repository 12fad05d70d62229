//! Latest-price book for one batch
//!
//! One slot per pair of the batch, addressed by the slot index the batch
//! descriptor routes wire symbols to. Each slot is an `AtomicU64` holding the
//! f64 bit pattern, so the supervisor (single writer) and the flusher
//! (snapshot reader) never contend on a lock.

use std::sync::atomic::{AtomicU64, Ordering};

use quotes::Pair;

/// Bit pattern marking a slot that has never received a price. It is a NaN
/// payload, and non-finite prices are never stored.
const UNSET: u64 = u64::MAX;

pub struct PriceBook {
    pairs: Vec<Pair>,
    slots: Box<[AtomicU64]>,
}

impl PriceBook {
    pub fn new(pairs: Vec<Pair>) -> Self {
        let slots = pairs.iter().map(|_| AtomicU64::new(UNSET)).collect();
        Self { pairs, slots }
    }

    /// Record the latest price for a slot. Last write wins.
    ///
    /// Out-of-range slots and non-finite prices are ignored.
    pub fn update(&self, slot: usize, price: f64) {
        if !price.is_finite() {
            return;
        }
        if let Some(cell) = self.slots.get(slot) {
            cell.store(price.to_bits(), Ordering::Release);
        }
    }

    pub fn get(&self, slot: usize) -> Option<f64> {
        let bits = self.slots.get(slot)?.load(Ordering::Acquire);
        (bits != UNSET).then(|| f64::from_bits(bits))
    }

    /// Point-in-time copy of every pair that has a price
    pub fn snapshot(&self) -> Vec<(Pair, f64)> {
        self.pairs
            .iter()
            .enumerate()
            .filter_map(|(slot, pair)| self.get(slot).map(|price| (pair.clone(), price)))
            .collect()
    }

    /// Number of pairs with a price
    pub fn populated(&self) -> usize {
        self.slots
            .iter()
            .filter(|cell| cell.load(Ordering::Acquire) != UNSET)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots
            .iter()
            .all(|cell| cell.load(Ordering::Acquire) == UNSET)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
