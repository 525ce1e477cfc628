use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::backend::{ClassifierBackend, DirectionModel, DirectionPrediction, Fitted};
use super::features::{CandleFeatures, LabeledSample, MinMaxScaler};
use super::persistence::{ModelMetrics, ModelSlot};
use crate::error::{LearnerError, Result};

/// Logistic regression coefficients plus the scaler they were fitted against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticDirectionModel {
    coefficients: Vec<f64>,
    intercept: f64,
    scaler: MinMaxScaler,
}

impl LogisticDirectionModel {
    pub fn probability_green(&self, features: &CandleFeatures) -> f64 {
        let normalized = self.scaler.transform(features);
        let z = self.intercept
            + self
                .coefficients
                .iter()
                .zip(normalized.iter())
                .map(|(w, x)| w * x)
                .sum::<f64>();
        sigmoid(z)
    }
}

impl DirectionModel for LogisticDirectionModel {
    fn predict(&self, features: &CandleFeatures) -> DirectionPrediction {
        let probability = self.probability_green(features);
        DirectionPrediction {
            label: probability >= 0.5,
            probability,
        }
    }

    fn encode(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| LearnerError::persistence(ModelSlot::Classifier, e))
    }
}

/// Min-max normalised logistic regression trained by batch gradient descent
#[derive(Debug, Clone)]
pub struct LogisticBackend {
    max_iter: usize,
    learning_rate: f64,
    l2_lambda: f64,
}

impl Default for LogisticBackend {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            learning_rate: 0.5,
            l2_lambda: 0.001,
        }
    }
}

impl LogisticBackend {
    /// Fit logistic regression via gradient descent
    fn fit_logistic_regression(&self, features: &Array2<f64>, labels: &[f64]) -> (Vec<f64>, f64) {
        let n = features.nrows();
        let num_features = features.ncols();

        let mut coefficients = vec![0.0; num_features];
        let mut intercept = 0.0;

        for _iter in 0..self.max_iter {
            let mut grad_coef = vec![0.0; num_features];
            let mut grad_intercept = 0.0;

            for (i, row) in features.outer_iter().enumerate() {
                let z = intercept + row.iter().zip(&coefficients).map(|(x, w)| x * w).sum::<f64>();
                let error = sigmoid(z) - labels[i];

                grad_intercept += error;
                for (g, x) in grad_coef.iter_mut().zip(row.iter()) {
                    *g += error * x;
                }
            }

            intercept -= self.learning_rate * grad_intercept / n as f64;
            for (w, g) in coefficients.iter_mut().zip(&grad_coef) {
                *w -= self.learning_rate * (g / n as f64 + self.l2_lambda * *w);
            }
        }

        (coefficients, intercept)
    }
}

impl ClassifierBackend for LogisticBackend {
    fn name(&self) -> &str {
        "logistic_regression"
    }

    fn fit(&self, samples: &[LabeledSample]) -> Result<Fitted<dyn DirectionModel>> {
        let n = samples.len();
        if n == 0 {
            return Err(LearnerError::training(ModelSlot::Classifier, "no training samples"));
        }

        let rows: Vec<CandleFeatures> = samples.iter().map(|s| s.features).collect();
        let scaler = MinMaxScaler::fit(&rows);

        let mut features = Array2::<f64>::zeros((n, CandleFeatures::NUM_FEATURES));
        for (i, row) in rows.iter().enumerate() {
            for (j, value) in scaler.transform(row).iter().enumerate() {
                features[[i, j]] = *value;
            }
        }
        let labels: Vec<f64> = samples.iter().map(|s| if s.label { 1.0 } else { 0.0 }).collect();

        let (coefficients, intercept) = self.fit_logistic_regression(&features, &labels);
        if !intercept.is_finite() || coefficients.iter().any(|w| !w.is_finite()) {
            return Err(LearnerError::training(ModelSlot::Classifier, "gradient descent diverged"));
        }

        let model = LogisticDirectionModel { coefficients, intercept, scaler };

        let correct = samples
            .iter()
            .filter(|s| model.predict(&s.features).label == s.label)
            .count();
        let accuracy = correct as f64 / n as f64;
        let greens = samples.iter().filter(|s| s.label).count();

        info!(
            "Classifier trained: {} samples, {:.1}% training accuracy, {}/{} green",
            n,
            accuracy * 100.0,
            greens,
            n
        );

        Ok(Fitted {
            model: Box::new(model),
            metrics: ModelMetrics {
                train_samples: n,
                accuracy: Some(accuracy),
                clusters: None,
            },
        })
    }

    fn decode(&self, payload: serde_json::Value) -> Result<Box<dyn DirectionModel>> {
        let model: LogisticDirectionModel = serde_json::from_value(payload)
            .map_err(|e| LearnerError::persistence(ModelSlot::Classifier, e))?;
        if model.coefficients.len() != CandleFeatures::NUM_FEATURES {
            return Err(LearnerError::persistence(
                ModelSlot::Classifier,
                format!("expected {} coefficients, found {}", CandleFeatures::NUM_FEATURES, model.coefficients.len()),
            ));
        }
        Ok(Box::new(model))
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Green follows candles whose close sits in the upper half of the range
    fn separable_samples() -> Vec<LabeledSample> {
        (0..60)
            .map(|i| {
                let close = 100.0 + (i % 20) as f64;
                let features = CandleFeatures {
                    open: 110.0,
                    high: 120.0,
                    low: 100.0,
                    close,
                    volume: 50.0 + i as f64,
                };
                LabeledSample::new(features, close > 110.0)
            })
            .collect()
    }

    #[test]
    fn test_learns_separable_direction() {
        let backend = LogisticBackend::default();
        let fitted = backend.fit(&separable_samples()).unwrap();

        assert_eq!(fitted.metrics.train_samples, 60);
        assert!(fitted.metrics.accuracy.unwrap() > 0.8);

        let high_close = CandleFeatures { open: 110.0, high: 120.0, low: 100.0, close: 119.0, volume: 60.0 };
        let low_close = CandleFeatures { close: 101.0, ..high_close };
        let up = fitted.model.predict(&high_close);
        let down = fitted.model.predict(&low_close);
        assert!(up.label);
        assert!(!down.label);
        assert!(up.probability > 0.5 && up.probability <= 1.0);
        assert!(down.probability < 0.5 && down.probability >= 0.0);
    }

    #[test]
    fn test_prediction_is_deterministic() {
        let backend = LogisticBackend::default();
        let fitted = backend.fit(&separable_samples()).unwrap();
        let input = separable_samples()[7].features;

        assert_eq!(fitted.model.predict(&input), fitted.model.predict(&input));
    }

    #[test]
    fn test_encoded_model_decodes_to_same_predictions() {
        let backend = LogisticBackend::default();
        let fitted = backend.fit(&separable_samples()).unwrap();
        let decoded = backend.decode(fitted.model.encode().unwrap()).unwrap();

        for sample in separable_samples().iter().take(5) {
            assert_eq!(fitted.model.predict(&sample.features), decoded.predict(&sample.features));
        }
    }

    #[test]
    fn test_empty_training_set_fails() {
        let err = LogisticBackend::default().fit(&[]).err().unwrap();
        assert!(matches!(err, LearnerError::TrainingFailure { slot: ModelSlot::Classifier, .. }));
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let payload = serde_json::json!({
            "coefficients": [1.0],
            "intercept": 0.0,
            "scaler": { "mins": [0.0], "maxs": [1.0] }
        });
        assert!(LogisticBackend::default().decode(payload).is_err());
    }
}
