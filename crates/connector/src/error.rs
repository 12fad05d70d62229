use quotes::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("invalid stream url: {0}")]
    InvalidUrl(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BatchError {
    #[error("no markets to ingest")]
    NoMarkets,
    #[error("batch size limit must be at least 1")]
    InvalidLimit,
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("JSON parse error: {0}")]
    Json(String),

    #[error("catalog lists no tradable pairs for the configured quote assets")]
    Empty,
}

#[derive(Error, Debug)]
pub enum FlushError {
    #[error("quote write failed: {0}")]
    Write(#[source] StoreError),
    #[error("retention cleanup failed: {0}")]
    Cleanup(#[source] StoreError),
}
