use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV bar for a symbol. Identity is `(symbol, open_time)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    pub trade_count: u64,
    pub taker_buy_base_volume: Decimal,
    pub taker_buy_quote_volume: Decimal,
}

impl Candle {
    /// Closed above its own open ("green")
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Check the bar invariants: close after open, non-negative values,
    /// and open/close inside the high-low range.
    pub fn validate(&self) -> Result<(), String> {
        if self.close_time <= self.open_time {
            return Err(format!(
                "{} {}: close_time {} not after open_time",
                self.symbol, self.open_time, self.close_time
            ));
        }
        let prices = [self.open, self.high, self.low, self.close, self.volume];
        if prices.iter().any(|p| p.is_sign_negative() && !p.is_zero()) {
            return Err(format!("{} {}: negative price or volume", self.symbol, self.open_time));
        }
        if self.low > self.open.min(self.close) || self.high < self.open.max(self.close) {
            return Err(format!(
                "{} {}: open/close outside [{}, {}]",
                self.symbol, self.open_time, self.low, self.high
            ));
        }
        Ok(())
    }
}
