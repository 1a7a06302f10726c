//! SQLite price history.
//!
//! Append-only table of mid-price samples. A single connection sits behind an async
//! mutex so the dispatcher task and HTTP handlers can share it.

use crate::errors::{AppError, Result};
use crate::models::PriceSample;
use rusqlite::{Connection, params};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::info;

pub struct PriceHistoryStore {
    conn: Mutex<Option<Connection>>,
}

impl PriceHistoryStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub async fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self::with_connection(conn)?;
        info!(path = %db_path, "[STORE] price history ready");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS price_history (
                symbol TEXT NOT NULL,
                price REAL NOT NULL,
                timestamp REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_price_history_symbol_ts
                ON price_history(symbol, timestamp);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    pub async fn append(&self, sample: &PriceSample) -> Result<()> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(AppError::StoreClosed)?;
        conn.execute(
            "INSERT INTO price_history (symbol, price, timestamp) VALUES (?1, ?2, ?3)",
            params![sample.symbol, sample.price, sample.timestamp],
        )?;
        Ok(())
    }

    /// Most recent sample for `symbol`, if any was ever recorded.
    pub async fn latest(&self, symbol: &str) -> Result<Option<PriceSample>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(AppError::StoreClosed)?;
        let mut stmt = conn.prepare_cached(
            "SELECT price, timestamp FROM price_history
             WHERE symbol = ?1 ORDER BY timestamp DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![symbol], |row| {
            Ok(PriceSample {
                symbol: symbol.to_string(),
                price: row.get(0)?,
                timestamp: row.get(1)?,
            })
        })?;
        Ok(rows.next().transpose()?)
    }

    /// Every sample for `symbol` strictly newer than `after`, newest first.
    pub async fn since(&self, symbol: &str, after: f64) -> Result<Vec<PriceSample>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(AppError::StoreClosed)?;
        let mut stmt = conn.prepare_cached(
            "SELECT price, timestamp FROM price_history
             WHERE symbol = ?1 AND timestamp > ?2 ORDER BY timestamp DESC",
        )?;
        let rows = stmt.query_map(params![symbol, after], |row| {
            Ok(PriceSample {
                symbol: symbol.to_string(),
                price: row.get(0)?,
                timestamp: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Release the connection. Later calls fail with `StoreClosed`.
    pub async fn close(&self) -> Result<()> {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| AppError::Sqlite(e))?;
            info!("[STORE] price history closed");
        }
        Ok(())
    }
}
