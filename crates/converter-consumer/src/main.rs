//! converter-consumer: quote ingestion binary
//!
//! Discovers tradable pairs, splits them into stream batches and keeps the
//! quote history fed until SIGTERM/ctrl-c.

mod config;

use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use converter_connector::{
    metrics, partition, run_ingestion, run_server, BinanceCatalog, BinanceStream, IngestConfig,
    ServerState, TickSource,
};
use quotes::{InMemoryQuoteStore, PgQuoteStore, QuoteStore};

use crate::config::{Config, LogFormat, StoreKind};

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "converter_consumer=info,converter_connector=info,quotes=info".into()
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn open_store(config: &Config) -> Result<Arc<dyn QuoteStore>, Box<dyn std::error::Error>> {
    match config.store {
        StoreKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL is required for the postgres store")?;
            Ok(Arc::new(PgQuoteStore::connect(url).await?))
        }
        StoreKind::Memory => {
            info!("Using in-memory quote store");
            Ok(Arc::new(InMemoryQuoteStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(config.log_format);
    info!(
        store = ?config.store,
        supported_quotes = %config.supported_quotes,
        max_streams_per_conn = config.max_streams_per_conn,
        "converter-consumer starting"
    );

    let store = open_store(&config).await.map_err(|e| {
        error!(error = %e, "Failed to open quote store");
        e
    })?;

    let catalog = BinanceCatalog::new(&config.binance_api_url)?;
    let markets = catalog
        .list_tradable_pairs(&config.quote_filter())
        .await
        .map_err(|e| {
            error!(error = %e, "Pair discovery failed");
            e
        })?;

    let batches = partition(markets, config.max_streams_per_conn)?;
    metrics::set_batches_total(batches.len());
    info!(batches = batches.len(), "Partitioned markets into stream batches");

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        shutdown_tx.send(true).ok();
    });

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Health server listening");
    let server = tokio::spawn(run_server(
        listener,
        ServerState::new(batches.len(), store.clone()),
        shutdown_rx.clone(),
    ));

    let source: Arc<dyn TickSource> = Arc::new(
        BinanceStream::new(&config.binance_ws_url)
            .with_heartbeat(config.heartbeat())
            .with_idle_timeout(config.idle_timeout()),
    );
    let ingest_config = IngestConfig {
        flush: config.flush_config(),
        ..IngestConfig::default()
    };

    run_ingestion(batches, source, store, ingest_config, shutdown_rx).await;

    match server.await {
        Ok(Err(e)) => error!(error = %e, "Health server failed"),
        Err(e) => error!(error = %e, "Health server task failed"),
        Ok(Ok(())) => {}
    }

    info!("converter-consumer stopped");
    Ok(())
}

/// Listen for SIGTERM (Kubernetes pod termination) or ctrl-c.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => info!("SIGTERM received"),
                _ = ctrl_c() => info!("ctrl-c received"),
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to listen for SIGTERM");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c().await;
}

/// Resolves on ctrl-c; never resolves if the handler cannot be installed
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
