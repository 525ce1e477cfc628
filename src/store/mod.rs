use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::Candle;

#[cfg(test)]
pub mod memory;

/// Durable, append-only history of candles per symbol
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Idempotent on `(symbol, open_time)`; returns how many rows were new
    async fn insert_candles(&self, candles: &[Candle]) -> Result<usize>;

    /// Every candle of `symbol`, ascending by close time
    async fn get_candles(&self, symbol: &str) -> Result<Vec<Candle>>;

    /// Candles with `close_time > after`, ascending by close time
    async fn get_candles_after(&self, symbol: &str, after: DateTime<Utc>) -> Result<Vec<Candle>>;

    /// The latest candle with `close_time < before`
    async fn candle_before(&self, symbol: &str, before: DateTime<Utc>) -> Result<Option<Candle>>;

    async fn max_close_time(&self, symbol: &str) -> Result<Option<DateTime<Utc>>>;

    async fn count(&self, symbol: &str) -> Result<u64>;
}

/// Durable "last processed close time" per symbol
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResumeStateStore: Send + Sync {
    /// Create the cursor record if missing; never overwrites an existing value
    async fn ensure_initialized(&self, symbol: &str) -> Result<()>;

    /// `None` only when the cursor was never set
    async fn get_cursor(&self, symbol: &str) -> Result<Option<DateTime<Utc>>>;

    /// Returns once the value is durable
    async fn set_cursor(&self, symbol: &str, processed_through: DateTime<Utc>) -> Result<()>;
}
