use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Candle;

/// Numeric view of one candle fed to both models
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandleFeatures {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl CandleFeatures {
    pub const NUM_FEATURES: usize = 5;

    pub fn from_candle(candle: &Candle) -> Self {
        Self {
            open: to_f64(candle.open),
            high: to_f64(candle.high),
            low: to_f64(candle.low),
            close: to_f64(candle.close),
            volume: to_f64(candle.volume),
        }
    }

    pub fn to_array(&self) -> [f64; Self::NUM_FEATURES] {
        [self.open, self.high, self.low, self.close, self.volume]
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Features of one candle paired with the direction of the candle after it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub features: CandleFeatures,
    /// `true` when the following candle closed above its open
    pub label: bool,
}

impl LabeledSample {
    pub fn new(features: CandleFeatures, label: bool) -> Self {
        Self { features, label }
    }
}

/// Next-candle-direction labeling: candle `i` gets `close[i+1] > open[i+1]`.
/// The last candle has no successor and yields no sample.
pub fn build_labeled_samples(candles: &[Candle]) -> Vec<LabeledSample> {
    candles
        .windows(2)
        .map(|pair| LabeledSample::new(CandleFeatures::from_candle(&pair[0]), pair[1].is_bullish()))
        .collect()
}

pub fn build_unlabeled(candles: &[Candle]) -> Vec<CandleFeatures> {
    candles.iter().map(CandleFeatures::from_candle).collect()
}

/// Per-feature min-max scaling to [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    mins: Vec<f64>,
    maxs: Vec<f64>,
}

impl MinMaxScaler {
    pub fn fit(rows: &[CandleFeatures]) -> Self {
        let mut mins = vec![f64::INFINITY; CandleFeatures::NUM_FEATURES];
        let mut maxs = vec![f64::NEG_INFINITY; CandleFeatures::NUM_FEATURES];
        for row in rows {
            for (j, value) in row.to_array().iter().enumerate() {
                mins[j] = mins[j].min(*value);
                maxs[j] = maxs[j].max(*value);
            }
        }
        if rows.is_empty() {
            mins.fill(0.0);
            maxs.fill(0.0);
        }
        Self { mins, maxs }
    }

    /// Constant columns map to 0.0
    pub fn transform(&self, features: &CandleFeatures) -> [f64; CandleFeatures::NUM_FEATURES] {
        let mut out = features.to_array();
        for (j, value) in out.iter_mut().enumerate() {
            let span = self.maxs[j] - self.mins[j];
            *value = if span > 1e-12 { (*value - self.mins[j]) / span } else { 0.0 };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::candle::fixtures::hourly;
    use rust_decimal_macros::dec;

    #[test]
    fn test_label_comes_from_following_candle() {
        let a = hourly(0, dec!(100), dec!(110));
        let b = hourly(1, dec!(110), dec!(105));
        let c = hourly(2, dec!(105), dec!(120));

        let samples = build_labeled_samples(&[a.clone(), b.clone(), c]);

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].features, CandleFeatures::from_candle(&a));
        assert!(!samples[0].label, "A is labeled with B (red)");
        assert_eq!(samples[1].features, CandleFeatures::from_candle(&b));
        assert!(samples[1].label, "B is labeled with C (green)");
    }

    #[test]
    fn test_short_sequences_yield_nothing() {
        assert!(build_labeled_samples(&[]).is_empty());
        assert!(build_labeled_samples(&[hourly(0, dec!(1), dec!(2))]).is_empty());
    }

    #[test]
    fn test_features_from_candle() {
        let c = hourly(0, dec!(100.5), dec!(101.25));
        let f = CandleFeatures::from_candle(&c);
        assert_eq!(f.open, 100.5);
        assert_eq!(f.close, 101.25);
        assert_eq!(f.high, 102.25);
        assert_eq!(f.low, 99.5);
        assert_eq!(f.volume, 10.0);
    }

    #[test]
    fn test_scaler_bounds_and_constant_columns() {
        let rows = vec![
            CandleFeatures { open: 10.0, high: 20.0, low: 5.0, close: 15.0, volume: 7.0 },
            CandleFeatures { open: 30.0, high: 40.0, low: 5.0, close: 35.0, volume: 7.0 },
        ];
        let scaler = MinMaxScaler::fit(&rows);

        assert_eq!(scaler.transform(&rows[0]), [0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(scaler.transform(&rows[1]), [1.0, 1.0, 0.0, 1.0, 0.0]);

        let mid = CandleFeatures { open: 20.0, high: 30.0, low: 5.0, close: 25.0, volume: 7.0 };
        assert_eq!(scaler.transform(&mid)[0], 0.5);
    }
}
