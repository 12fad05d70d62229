use thiserror::Error;

/// Errors from quote storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid database URL: {0}")]
    InvalidUrl(String),

    #[error("pool error: {0}")]
    Pool(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("migration failed: {0}")]
    Migration(String),
}
