//! In-memory stores for tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use super::{CandleStore, ResumeStateStore};
use crate::error::Result;
use crate::types::Candle;

#[derive(Default)]
pub struct MemoryCandleStore {
    candles: Mutex<Vec<Candle>>,
}

impl MemoryCandleStore {
    pub fn with(candles: Vec<Candle>) -> Self {
        let store = Self::default();
        store.push(candles);
        store
    }

    /// Synchronous insert for test setup
    pub fn push(&self, candles: Vec<Candle>) {
        let mut all = self.candles.lock().unwrap();
        for candle in candles {
            let duplicate = all
                .iter()
                .any(|c| c.symbol == candle.symbol && c.open_time == candle.open_time);
            if !duplicate {
                all.push(candle);
            }
        }
        all.sort_by_key(|c| c.close_time);
    }

    fn filtered(&self, symbol: &str, keep: impl Fn(&Candle) -> bool) -> Vec<Candle> {
        self.candles
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.symbol == symbol && keep(c))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CandleStore for MemoryCandleStore {
    async fn insert_candles(&self, candles: &[Candle]) -> Result<usize> {
        let before = self.candles.lock().unwrap().len();
        self.push(candles.to_vec());
        Ok(self.candles.lock().unwrap().len() - before)
    }

    async fn get_candles(&self, symbol: &str) -> Result<Vec<Candle>> {
        Ok(self.filtered(symbol, |_| true))
    }

    async fn get_candles_after(&self, symbol: &str, after: DateTime<Utc>) -> Result<Vec<Candle>> {
        Ok(self.filtered(symbol, |c| c.close_time > after))
    }

    async fn candle_before(&self, symbol: &str, before: DateTime<Utc>) -> Result<Option<Candle>> {
        Ok(self.filtered(symbol, |c| c.close_time < before).pop())
    }

    async fn max_close_time(&self, symbol: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.filtered(symbol, |_| true).last().map(|c| c.close_time))
    }

    async fn count(&self, symbol: &str) -> Result<u64> {
        Ok(self.filtered(symbol, |_| true).len() as u64)
    }
}

/// Cursor store that also remembers every value written
#[derive(Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<HashMap<String, Option<DateTime<Utc>>>>,
    writes: Mutex<Vec<DateTime<Utc>>>,
}

impl MemoryCursorStore {
    pub fn starting_at(symbol: &str, cursor: DateTime<Utc>) -> Self {
        let store = Self::default();
        store.cursors.lock().unwrap().insert(symbol.to_string(), Some(cursor));
        store
    }

    pub fn writes(&self) -> Vec<DateTime<Utc>> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResumeStateStore for MemoryCursorStore {
    async fn ensure_initialized(&self, symbol: &str) -> Result<()> {
        self.cursors.lock().unwrap().entry(symbol.to_string()).or_insert(None);
        Ok(())
    }

    async fn get_cursor(&self, symbol: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.cursors.lock().unwrap().get(symbol).copied().flatten())
    }

    async fn set_cursor(&self, symbol: &str, processed_through: DateTime<Utc>) -> Result<()> {
        self.cursors
            .lock()
            .unwrap()
            .insert(symbol.to_string(), Some(processed_through));
        self.writes.lock().unwrap().push(processed_through);
        Ok(())
    }
}
