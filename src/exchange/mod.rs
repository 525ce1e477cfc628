pub mod binance;

pub use binance::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Candle, TimeFrame};

/// Source of raw klines, normalized into [`Candle`]s
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Up to `limit` candles whose open time is at or after `start`, ascending
    async fn get_klines(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        start: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Candle>>;
}
