//! quotes: persisted quote history for the converter
//!
//! Provides the pair/quote data model, the `QuoteStore` abstraction used by
//! both the ingestion pipeline and the conversion API, a PostgreSQL-backed
//! implementation and an in-memory implementation for tests and local runs.

pub mod db;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use db::PgQuoteStore;
pub use error::StoreError;
pub use memory::InMemoryQuoteStore;
pub use store::QuoteStore;
pub use types::{MarketPair, Pair, QuoteRecord};
