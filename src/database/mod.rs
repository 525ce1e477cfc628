use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use crate::engine::observer::{Observation, ObservationSink};
use crate::error::{LearnerError, Result};
use crate::store::{CandleStore, ResumeStateStore};
use crate::types::Candle;

const CANDLE_COLUMNS: &str = "symbol, open_time_ms, close_time_ms, open, high, low, close, volume, \
     quote_volume, trade_count, taker_buy_base_volume, taker_buy_quote_volume";

/// SQLite-backed candle history, resume cursors and observations
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Initialize database with schema
    pub async fn new(db_url: &str) -> Result<Self> {
        info!("Initializing SQLite database at: {}", db_url);

        // Create database file if it doesn't exist
        let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.create_schema().await?;

        info!("Database initialized successfully");
        Ok(db)
    }

    /// Create database schema
    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                symbol TEXT NOT NULL,
                open_time_ms INTEGER NOT NULL,
                close_time_ms INTEGER NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume TEXT NOT NULL,
                quote_volume TEXT NOT NULL,
                trade_count INTEGER NOT NULL,
                taker_buy_base_volume TEXT NOT NULL,
                taker_buy_quote_volume TEXT NOT NULL,
                PRIMARY KEY (symbol, open_time_ms)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_candles_close ON candles(symbol, close_time_ms)
            "#,
        )
        .execute(&self.pool)
        .await?;

        // One cursor row per symbol
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processor_state (
                symbol TEXT PRIMARY KEY,
                last_processed_ms INTEGER,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                predicted INTEGER NOT NULL,
                probability REAL NOT NULL,
                actual INTEGER NOT NULL,
                recorded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_observations_symbol ON observations(symbol, timestamp_ms)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent `limit` candles, ascending by close time
    pub async fn latest_candles(&self, symbol: &str, limit: u32) -> Result<Vec<Candle>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM (SELECT * FROM candles WHERE symbol = ? ORDER BY close_time_ms DESC LIMIT ?) \
             ORDER BY close_time_ms ASC",
            CANDLE_COLUMNS
        ))
        .bind(symbol)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_candle).collect()
    }

    /// Most recent observations for a symbol, newest first
    pub async fn recent_observations(&self, symbol: &str, limit: u32) -> Result<Vec<Observation>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, timestamp_ms, predicted, probability, actual
            FROM observations
            WHERE symbol = ?
            ORDER BY timestamp_ms DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(symbol)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut observations = Vec::with_capacity(rows.len());
        for row in rows {
            observations.push(Observation {
                symbol: row.get("symbol"),
                timestamp: from_millis(row.get("timestamp_ms"))?,
                predicted_label: row.get::<i64, _>("predicted") != 0,
                probability: row.get("probability"),
                actual_label: row.get::<i64, _>("actual") != 0,
            });
        }
        Ok(observations)
    }
}

#[async_trait]
impl CandleStore for Database {
    async fn insert_candles(&self, candles: &[Candle]) -> Result<usize> {
        if candles.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for candle in candles {
            let result = sqlx::query(&format!(
                "INSERT OR IGNORE INTO candles ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                CANDLE_COLUMNS
            ))
            .bind(&candle.symbol)
            .bind(candle.open_time.timestamp_millis())
            .bind(candle.close_time.timestamp_millis())
            .bind(candle.open.to_string())
            .bind(candle.high.to_string())
            .bind(candle.low.to_string())
            .bind(candle.close.to_string())
            .bind(candle.volume.to_string())
            .bind(candle.quote_volume.to_string())
            .bind(candle.trade_count as i64)
            .bind(candle.taker_buy_base_volume.to_string())
            .bind(candle.taker_buy_quote_volume.to_string())
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;

        debug!("Inserted {} of {} candles", inserted, candles.len());
        Ok(inserted)
    }

    async fn get_candles(&self, symbol: &str) -> Result<Vec<Candle>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM candles WHERE symbol = ? ORDER BY close_time_ms ASC",
            CANDLE_COLUMNS
        ))
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_candle).collect()
    }

    async fn get_candles_after(&self, symbol: &str, after: DateTime<Utc>) -> Result<Vec<Candle>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM candles WHERE symbol = ? AND close_time_ms > ? ORDER BY close_time_ms ASC",
            CANDLE_COLUMNS
        ))
        .bind(symbol)
        .bind(after.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_candle).collect()
    }

    async fn candle_before(&self, symbol: &str, before: DateTime<Utc>) -> Result<Option<Candle>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM candles WHERE symbol = ? AND close_time_ms < ? \
             ORDER BY close_time_ms DESC LIMIT 1",
            CANDLE_COLUMNS
        ))
        .bind(symbol)
        .bind(before.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_candle).transpose()
    }

    async fn max_close_time(&self, symbol: &str) -> Result<Option<DateTime<Utc>>> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(close_time_ms) FROM candles WHERE symbol = ?")
            .bind(symbol)
            .fetch_one(&self.pool)
            .await?;

        max.map(from_millis).transpose()
    }

    async fn count(&self, symbol: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM candles WHERE symbol = ?")
            .bind(symbol)
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }
}

#[async_trait]
impl ResumeStateStore for Database {
    async fn ensure_initialized(&self, symbol: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO processor_state (symbol, last_processed_ms, updated_at)
            VALUES (?, NULL, ?)
            "#,
        )
        .bind(symbol)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| LearnerError::persistence(format!("cursor for {}", symbol), e))?;

        Ok(())
    }

    async fn get_cursor(&self, symbol: &str) -> Result<Option<DateTime<Utc>>> {
        let last: Option<Option<i64>> =
            sqlx::query_scalar("SELECT last_processed_ms FROM processor_state WHERE symbol = ?")
                .bind(symbol)
                .fetch_optional(&self.pool)
                .await?;

        last.flatten().map(from_millis).transpose()
    }

    async fn set_cursor(&self, symbol: &str, processed_through: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processor_state (symbol, last_processed_ms, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                last_processed_ms = excluded.last_processed_ms,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(symbol)
        .bind(processed_through.timestamp_millis())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| LearnerError::persistence(format!("cursor for {}", symbol), e))?;

        Ok(())
    }
}

#[async_trait]
impl ObservationSink for Database {
    async fn record(&self, observation: &Observation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO observations (symbol, timestamp_ms, predicted, probability, actual, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&observation.symbol)
        .bind(observation.timestamp.timestamp_millis())
        .bind(observation.predicted_label as i64)
        .bind(observation.probability)
        .bind(observation.actual_label as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| LearnerError::StoreUnavailable(format!("invalid timestamp: {}", ms)))
}

fn decimal(row: &SqliteRow, column: &str) -> Result<Decimal> {
    let raw: String = row.get(column);
    Decimal::from_str(&raw)
        .map_err(|e| LearnerError::StoreUnavailable(format!("bad decimal in {}: {} ({})", column, raw, e)))
}

fn row_to_candle(row: &SqliteRow) -> Result<Candle> {
    Ok(Candle {
        symbol: row.get("symbol"),
        open_time: from_millis(row.get("open_time_ms"))?,
        close_time: from_millis(row.get("close_time_ms"))?,
        open: decimal(row, "open")?,
        high: decimal(row, "high")?,
        low: decimal(row, "low")?,
        close: decimal(row, "close")?,
        volume: decimal(row, "volume")?,
        quote_volume: decimal(row, "quote_volume")?,
        trade_count: row.get::<i64, _>("trade_count").max(0) as u64,
        taker_buy_base_volume: decimal(row, "taker_buy_base_volume")?,
        taker_buy_quote_volume: decimal(row, "taker_buy_quote_volume")?,
    })
}
