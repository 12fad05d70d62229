use std::collections::HashSet;
use std::time::Duration;

use clap::builder::TypedValueParser;
use clap::{Parser, ValueEnum};

use converter_connector::discovery::{parse_quote_filter, BINANCE_API_URL};
use converter_connector::flusher::{
    DEFAULT_FLUSH_INTERVAL_SECS, DEFAULT_RETENTION_DAYS,
};
use converter_connector::websocket::{
    BINANCE_WS_URL, DEFAULT_HEARTBEAT_SECS, DEFAULT_IDLE_TIMEOUT_SECS,
};
use converter_connector::FlushConfig;

/// Binance allows at most 1024 streams on one combined connection
pub const MAX_STREAMS_LIMIT: usize = 1024;
pub const DEFAULT_MAX_STREAMS_PER_CONN: usize = 800;
/// Upper bound on retention, one century
pub const MAX_RETENTION_DAYS: u64 = 36_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Postgres,
    /// Process-local store, for local runs without a database
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Parser, Debug)]
#[command(name = "converter-consumer")]
#[command(about = "Streams exchange tickers into the quote history")]
pub struct Config {
    /// Database URL (required for the postgres store)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Quote store backend
    #[arg(long, env = "STORE", value_enum, default_value = "postgres")]
    pub store: StoreKind,

    /// Combined-stream websocket base URL
    #[arg(long, env = "BINANCE_WS_URL", default_value = BINANCE_WS_URL)]
    pub binance_ws_url: String,

    /// REST API base URL used for pair discovery
    #[arg(long, env = "BINANCE_API_URL", default_value = BINANCE_API_URL)]
    pub binance_api_url: String,

    /// Comma-separated quote assets to ingest (empty = all)
    #[arg(long, env = "SUPPORTED_QUOTES", default_value = "USDT,USDC")]
    pub supported_quotes: String,

    /// Streams per websocket connection
    #[arg(
        long,
        env = "MAX_STREAMS_PER_CONN",
        default_value_t = DEFAULT_MAX_STREAMS_PER_CONN,
        value_parser = clap::value_parser!(u16).range(1..=MAX_STREAMS_LIMIT as i64).map(usize::from)
    )]
    pub max_streams_per_conn: usize,

    /// Seconds between quote flushes
    #[arg(long, env = "QUOTE_SAVE_INTERVAL_SECS", default_value_t = DEFAULT_FLUSH_INTERVAL_SECS)]
    pub quote_save_interval_secs: u64,

    /// Days of quote history to keep
    #[arg(
        long,
        env = "QUOTE_RETENTION_DAYS",
        default_value_t = DEFAULT_RETENTION_DAYS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_RETENTION_DAYS)
    )]
    pub quote_retention_days: u64,

    /// Websocket ping interval in seconds
    #[arg(long, env = "WS_HEARTBEAT_SECS", default_value_t = DEFAULT_HEARTBEAT_SECS)]
    pub ws_heartbeat_secs: u64,

    /// Seconds without a data frame before the stream is considered dead
    #[arg(long, env = "WS_IDLE_TIMEOUT_SECS", default_value_t = DEFAULT_IDLE_TIMEOUT_SECS)]
    pub ws_idle_timeout_secs: u64,

    /// Health/metrics server bind address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:9090")]
    pub listen_addr: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "json")]
    pub log_format: LogFormat,
}

impl Config {
    pub fn quote_filter(&self) -> HashSet<String> {
        parse_quote_filter(&self.supported_quotes)
    }

    pub fn flush_config(&self) -> FlushConfig {
        FlushConfig {
            interval: Duration::from_secs(self.quote_save_interval_secs),
            retention: Duration::from_secs(self.quote_retention_days.saturating_mul(24 * 60 * 60)),
            ..FlushConfig::default()
        }
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.ws_heartbeat_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_idle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["converter-consumer"]).unwrap();
        assert_eq!(config.store, StoreKind::Postgres);
        assert_eq!(config.max_streams_per_conn, 800);
        assert_eq!(config.binance_ws_url, "wss://stream.binance.com:9443");
        assert_eq!(config.binance_api_url, "https://api.binance.com");
        assert_eq!(config.log_format, LogFormat::Json);

        let filter = config.quote_filter();
        assert!(filter.contains("USDT") && filter.contains("USDC"));

        let flush = config.flush_config();
        assert_eq!(flush.interval, Duration::from_secs(30));
        assert_eq!(flush.retention, Duration::from_secs(7 * 86_400));
        assert_eq!(config.heartbeat(), Duration::from_secs(15));
        assert_eq!(config.idle_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::try_parse_from([
            "converter-consumer",
            "--store",
            "memory",
            "--supported-quotes",
            "",
            "--max-streams-per-conn",
            "200",
            "--quote-save-interval-secs",
            "5",
            "--log-format",
            "text",
        ])
        .unwrap();
        assert_eq!(config.store, StoreKind::Memory);
        assert!(config.quote_filter().is_empty());
        assert_eq!(config.max_streams_per_conn, 200);
        assert_eq!(config.flush_config().interval, Duration::from_secs(5));
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_stream_limit_bounds() {
        for bad in ["0", "1025"] {
            assert!(
                Config::try_parse_from(["converter-consumer", "--max-streams-per-conn", bad])
                    .is_err(),
                "{} accepted",
                bad
            );
        }
        let config =
            Config::try_parse_from(["converter-consumer", "--max-streams-per-conn", "1024"])
                .unwrap();
        assert_eq!(config.max_streams_per_conn, 1024);
    }

    #[test]
    fn test_retention_bounds() {
        for bad in ["0", "36501", "18446744073709551615"] {
            assert!(
                Config::try_parse_from(["converter-consumer", "--quote-retention-days", bad])
                    .is_err(),
                "{} accepted",
                bad
            );
        }
        let config =
            Config::try_parse_from(["converter-consumer", "--quote-retention-days", "36500"])
                .unwrap();
        assert_eq!(
            config.flush_config().retention,
            Duration::from_secs(36_500 * 86_400)
        );
    }
}
