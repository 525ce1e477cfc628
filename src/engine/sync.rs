use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::FetcherSettings;
use crate::error::{LearnerError, Result};
use crate::exchange::MarketDataSource;
use crate::store::CandleStore;
use crate::types::{Candle, TimeFrame};

/// Keeps the candle store in step with the exchange: a paged history
/// backfill followed by a polling live mode. Only closed candles are stored.
pub struct CandleSync {
    symbol: String,
    timeframe: TimeFrame,
    history_start: DateTime<Utc>,
    page_limit: u32,
    live_poll: std::time::Duration,
    source: Arc<dyn MarketDataSource>,
    store: Arc<dyn CandleStore>,
}

impl CandleSync {
    pub fn new(
        symbol: impl Into<String>,
        settings: &FetcherSettings,
        source: Arc<dyn MarketDataSource>,
        store: Arc<dyn CandleStore>,
    ) -> Result<Self> {
        Ok(Self {
            symbol: symbol.into(),
            timeframe: settings.timeframe().map_err(LearnerError::Config)?,
            history_start: settings.history_start().map_err(LearnerError::Config)?,
            page_limit: settings.page_limit,
            live_poll: settings.live_poll(),
            source,
            store,
        })
    }

    /// First open time not yet in the store
    async fn next_start(&self) -> Result<DateTime<Utc>> {
        Ok(match self.store.max_close_time(&self.symbol).await? {
            Some(last_close) => last_close + Duration::milliseconds(1),
            None => self.history_start,
        })
    }

    /// Closed, well-formed candles from a fetched page
    fn accept(&self, page: Vec<Candle>, now: DateTime<Utc>) -> Vec<Candle> {
        page.into_iter()
            .filter(|c| c.close_time < now)
            .filter(|c| match c.validate() {
                Ok(()) => true,
                Err(reason) => {
                    warn!("[{}] Skipping invalid candle: {}", self.symbol, reason);
                    false
                }
            })
            .collect()
    }

    /// Page forward from the newest stored candle until the exchange runs dry
    /// or the present is reached. Returns the number of new rows.
    pub async fn backfill(&self) -> Result<usize> {
        self.backfill_until(Utc::now()).await
    }

    pub async fn backfill_until(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut start = self.next_start().await?;
        let mut total = 0;
        info!("[{}] Backfilling {} candles from {}", self.symbol, self.timeframe, start);

        while start < now {
            let page = self
                .source
                .get_klines(&self.symbol, self.timeframe, start, self.page_limit)
                .await?;
            let Some(page_end) = page.last().map(|c| c.close_time) else {
                break;
            };
            let next = page_end + Duration::milliseconds(1);

            let candles = self.accept(page, now);
            if let Some(last) = candles.last() {
                total += self.store.insert_candles(&candles).await?;
                info!("[{}] Inserted up to {}", self.symbol, last.close_time);
            } else {
                debug!("[{}] Nothing storable in page ending {}", self.symbol, page_end);
            }

            if next <= start {
                break;
            }
            start = next;
        }

        info!("[{}] History sync complete, {} new candles", self.symbol, total);
        Ok(total)
    }

    /// One live poll: fetch whatever closed after the newest stored candle
    pub async fn sync_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let start = self.next_start().await?;
        if start > now {
            return Ok(0);
        }

        let page = self
            .source
            .get_klines(&self.symbol, self.timeframe, start, self.page_limit)
            .await?;
        let candles = self.accept(page, now);
        if candles.is_empty() {
            return Ok(0);
        }

        let inserted = self.store.insert_candles(&candles).await?;
        if let Some(last) = candles.last() {
            info!("[{}] [LIVE] Inserted {} candles up to {}", self.symbol, inserted, last.open_time);
        }
        Ok(inserted)
    }

    /// Poll forever; errors are logged and retried on the next tick
    pub async fn run_live(&self) {
        info!("[{}] Switching to live mode", self.symbol);
        loop {
            match self.sync_once(Utc::now()).await {
                Ok(n) if n > 0 => debug!("[{}] Live poll stored {} candles", self.symbol, n),
                Ok(_) => {}
                Err(e) => warn!("[{}] Live poll failed: {}", self.symbol, e),
            }
            tokio::time::sleep(self.live_poll).await;
        }
    }
}
