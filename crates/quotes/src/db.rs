use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::{NoTls, Row};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::QuoteStore;
use crate::types::{Pair, QuoteRecord};

/// Create a connection pool from a database URL
pub fn create_pool(database_url: &str) -> Result<Pool, StoreError> {
    // Parse the URL into deadpool config
    let pg_config: tokio_postgres::Config = database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| StoreError::InvalidUrl(e.to_string()))?;

    let mut cfg = Config::new();
    if let Some(host) = pg_config.get_hosts().first() {
        match host {
            tokio_postgres::config::Host::Tcp(h) => cfg.host = Some(h.clone()),
            #[cfg(unix)]
            tokio_postgres::config::Host::Unix(p) => {
                cfg.host = Some(p.to_string_lossy().to_string())
            }
        }
    }
    if let Some(port) = pg_config.get_ports().first() {
        cfg.port = Some(*port);
    }
    if let Some(user) = pg_config.get_user() {
        cfg.user = Some(user.to_string());
    }
    if let Some(password) = pg_config.get_password() {
        cfg.password = Some(String::from_utf8_lossy(password).to_string());
    }
    if let Some(dbname) = pg_config.get_dbname() {
        cfg.dbname = Some(dbname.to_string());
    }

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| StoreError::Pool(format!("failed to create pool: {}", e)))
}

/// Run database migrations
pub async fn run_migrations(pool: &Pool) -> Result<(), StoreError> {
    let client = pool
        .get()
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?;

    let migration_sql = include_str!("../migrations/001_quotes.sql");

    client
        .batch_execute(migration_sql)
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))?;

    info!("database migrations applied successfully");
    Ok(())
}

const INSERT_QUOTE: &str = "INSERT INTO quotes (base, quote, price, timestamp) VALUES ($1, $2, $3, $4)";

const SELECT_LATEST: &str = "SELECT base, quote, price, timestamp FROM quotes \
     WHERE base = $1 AND quote = $2 \
     ORDER BY timestamp DESC, id DESC LIMIT 1";

const SELECT_AT: &str = "SELECT base, quote, price, timestamp FROM quotes \
     WHERE base = $1 AND quote = $2 AND timestamp <= $3 \
     ORDER BY timestamp DESC, id DESC LIMIT 1";

const DELETE_OLDER_THAN: &str = "DELETE FROM quotes WHERE timestamp < $1";

/// PostgreSQL-backed quote history
#[derive(Clone)]
pub struct PgQuoteStore {
    pool: Pool,
}

impl PgQuoteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Connect, apply migrations and return a ready store
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = create_pool(database_url)?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

fn row_to_record(row: &Row) -> QuoteRecord {
    QuoteRecord {
        base: row.get("base"),
        quote: row.get("quote"),
        price: row.get("price"),
        timestamp: row.get("timestamp"),
    }
}

#[async_trait]
impl QuoteStore for PgQuoteStore {
    async fn insert(&self, record: &QuoteRecord) -> Result<(), StoreError> {
        let client = self.client().await?;
        client
            .execute(
                INSERT_QUOTE,
                &[&record.base, &record.quote, &record.price, &record.timestamp],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert quote: {}", e)))?;
        Ok(())
    }

    async fn insert_batch(&self, records: &[QuoteRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut client = self.client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| StoreError::Query(format!("begin tx: {}", e)))?;

        let stmt = tx
            .prepare(INSERT_QUOTE)
            .await
            .map_err(|e| StoreError::Query(format!("prepare insert: {}", e)))?;

        let mut written = 0u64;
        for record in records {
            written += tx
                .execute(
                    &stmt,
                    &[&record.base, &record.quote, &record.price, &record.timestamp],
                )
                .await
                .map_err(|e| StoreError::Query(format!("insert quote {}: {}", record.pair(), e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(format!("commit: {}", e)))?;

        debug!(rows = written, "quote batch committed");
        Ok(written)
    }

    async fn latest(&self, pair: &Pair) -> Result<Option<QuoteRecord>, StoreError> {
        let client = self.client().await?;
        let row = client
            .query_opt(SELECT_LATEST, &[&pair.base, &pair.quote])
            .await
            .map_err(|e| StoreError::Query(format!("latest quote {}: {}", pair, e)))?;
        Ok(row.as_ref().map(row_to_record))
    }

    async fn at(&self, pair: &Pair, at: DateTime<Utc>) -> Result<Option<QuoteRecord>, StoreError> {
        let client = self.client().await?;
        let row = client
            .query_opt(SELECT_AT, &[&pair.base, &pair.quote, &at])
            .await
            .map_err(|e| StoreError::Query(format!("quote {} at {}: {}", pair, at, e)))?;
        Ok(row.as_ref().map(row_to_record))
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let client = self.client().await?;
        let deleted = client
            .execute(DELETE_OLDER_THAN, &[&cutoff])
            .await
            .map_err(|e| StoreError::Query(format!("retention cleanup: {}", e)))?;
        debug!(deleted, cutoff = %cutoff, "retention cleanup");
        Ok(deleted)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let client = self.client().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| StoreError::Query(format!("ping: {}", e)))?;
        Ok(())
    }
}
