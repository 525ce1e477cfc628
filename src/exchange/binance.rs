use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use rust_decimal::Decimal;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use super::MarketDataSource;
use crate::error::{LearnerError, Result};
use crate::types::{Candle, TimeFrame};

/// Public market-data client for the Binance REST API
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl BinanceClient {
    pub fn new(base_url: impl Into<String>, requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
        }
    }
}

#[async_trait]
impl MarketDataSource for BinanceClient {
    async fn get_klines(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        start: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&startTime={}&limit={}",
            self.base_url,
            symbol,
            timeframe.as_str(),
            start.timestamp_millis(),
            limit
        );

        self.limiter.until_ready().await;
        debug!("GET {}", url);
        let resp: Vec<Vec<serde_json::Value>> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        resp.iter().map(|k| parse_kline(symbol, k)).collect()
    }
}

/// Decimal fields that fail to parse become zero
fn safe_decimal(value: Option<&serde_json::Value>) -> Decimal {
    match value {
        Some(serde_json::Value::String(s)) => Decimal::from_str(s).unwrap_or(Decimal::ZERO),
        Some(serde_json::Value::Number(n)) => Decimal::from_str(&n.to_string()).unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}

fn timestamp(value: Option<&serde_json::Value>, field: &str) -> Result<DateTime<Utc>> {
    value
        .and_then(|v| v.as_i64())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| LearnerError::InvalidCandle(format!("missing or invalid {}", field)))
}

/// Parse one kline array:
/// `[open_time, open, high, low, close, volume, close_time, quote_volume,
///   trade_count, taker_buy_base, taker_buy_quote, ignore]`
pub fn parse_kline(symbol: &str, k: &[serde_json::Value]) -> Result<Candle> {
    if k.len() < 11 {
        return Err(LearnerError::InvalidCandle(format!(
            "kline has {} fields, expected at least 11",
            k.len()
        )));
    }

    Ok(Candle {
        symbol: symbol.to_string(),
        open_time: timestamp(k.first(), "open time")?,
        close_time: timestamp(k.get(6), "close time")?,
        open: safe_decimal(k.get(1)),
        high: safe_decimal(k.get(2)),
        low: safe_decimal(k.get(3)),
        close: safe_decimal(k.get(4)),
        volume: safe_decimal(k.get(5)),
        quote_volume: safe_decimal(k.get(7)),
        trade_count: k.get(8).and_then(|v| v.as_u64()).unwrap_or(0),
        taker_buy_base_volume: safe_decimal(k.get(9)),
        taker_buy_quote_volume: safe_decimal(k.get(10)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn kline() -> Vec<serde_json::Value> {
        json!([
            1502942400000i64,
            "4261.48000000",
            "4313.62000000",
            "4261.32000000",
            "4308.83000000",
            "47.18100900",
            1502945999999i64,
            "202366.13839304",
            171,
            "35.16050300",
            "150952.47794304",
            "0"
        ])
        .as_array()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_parse_kline() {
        let candle = parse_kline("BTCUSDT", &kline()).unwrap();

        assert_eq!(candle.symbol, "BTCUSDT");
        assert_eq!(candle.open_time.timestamp_millis(), 1502942400000);
        assert_eq!(candle.close_time.timestamp_millis(), 1502945999999);
        assert_eq!(candle.open, dec!(4261.48));
        assert_eq!(candle.high, dec!(4313.62));
        assert_eq!(candle.low, dec!(4261.32));
        assert_eq!(candle.close, dec!(4308.83));
        assert_eq!(candle.volume, dec!(47.181009));
        assert_eq!(candle.trade_count, 171);
        assert_eq!(candle.taker_buy_quote_volume, dec!(150952.47794304));
        assert!(candle.validate().is_ok());
    }

    #[test]
    fn test_unparsable_numbers_default_to_zero() {
        let mut k = kline();
        k[5] = json!("not-a-number");
        k[8] = json!("x");

        let candle = parse_kline("BTCUSDT", &k).unwrap();
        assert_eq!(candle.volume, Decimal::ZERO);
        assert_eq!(candle.trade_count, 0);
    }

    #[test]
    fn test_missing_times_are_rejected() {
        let mut k = kline();
        k[6] = json!(null);
        assert!(matches!(parse_kline("BTCUSDT", &k), Err(LearnerError::InvalidCandle(_))));
        assert!(parse_kline("BTCUSDT", &k[..5]).is_err());
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = BinanceClient::new("http://localhost:8080/", 0);
        assert_eq!(client.base_url, "http://localhost:8080");
    }
}
