use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::backend::{ClustererBackend, Fitted, SegmentModel};
use super::features::{CandleFeatures, MinMaxScaler};
use super::persistence::{ModelMetrics, ModelSlot};
use crate::error::{LearnerError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansSegmentModel {
    centroids: Vec<Vec<f64>>,
    scaler: MinMaxScaler,
}

impl KMeansSegmentModel {
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    fn nearest(&self, point: &[f64]) -> usize {
        nearest_centroid(self.centroids.iter().map(|c| c.as_slice()), point)
    }
}

impl SegmentModel for KMeansSegmentModel {
    fn assign(&self, features: &CandleFeatures) -> u32 {
        self.nearest(&self.scaler.transform(features)) as u32
    }

    fn encode(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| LearnerError::persistence(ModelSlot::Clusterer, e))
    }
}

fn nearest_centroid<'a>(centroids: impl Iterator<Item = &'a [f64]>, point: &[f64]) -> usize {
    let mut min_dist = f64::INFINITY;
    let mut best = 0;
    for (idx, centroid) in centroids.enumerate() {
        let dist: f64 = point
            .iter()
            .zip(centroid.iter())
            .map(|(p, c)| (p - c).powi(2))
            .sum();
        if dist < min_dist {
            min_dist = dist;
            best = idx;
        }
    }
    best
}

/// Lloyd's k-means over min-max normalised features.
/// Initial assignment splits the samples into `k` contiguous blocks, so a
/// fit is deterministic for a given input order.
#[derive(Debug, Clone)]
pub struct KMeansBackend {
    max_iter: usize,
}

impl Default for KMeansBackend {
    fn default() -> Self {
        Self { max_iter: 100 }
    }
}

impl ClustererBackend for KMeansBackend {
    fn name(&self) -> &str {
        "kmeans"
    }

    fn fit(&self, samples: &[CandleFeatures], k: usize) -> Result<Fitted<dyn SegmentModel>> {
        let n_obs = samples.len();
        if k == 0 {
            return Err(LearnerError::training(ModelSlot::Clusterer, "cluster count must be >= 1"));
        }
        if n_obs < k {
            return Err(LearnerError::training(
                ModelSlot::Clusterer,
                format!("{} samples cannot form {} clusters", n_obs, k),
            ));
        }

        let scaler = MinMaxScaler::fit(samples);
        let n_features = CandleFeatures::NUM_FEATURES;
        let mut observations = Array2::<f64>::zeros((n_obs, n_features));
        for (i, row) in samples.iter().enumerate() {
            for (j, value) in scaler.transform(row).iter().enumerate() {
                observations[[i, j]] = *value;
            }
        }

        let mut labels: Vec<usize> = (0..n_obs).map(|i| (i * k) / n_obs).collect();
        let mut means = vec![vec![0.0; n_features]; k];
        let mut iterations = 0;

        for iter in 0..self.max_iter {
            iterations = iter + 1;

            // Update means; an emptied cluster keeps its previous centroid
            let mut sums = Array2::<f64>::zeros((k, n_features));
            let mut counts = vec![0usize; k];
            for (i, &label) in labels.iter().enumerate() {
                for j in 0..n_features {
                    sums[[label, j]] += observations[[i, j]];
                }
                counts[label] += 1;
            }
            for cluster in 0..k {
                if counts[cluster] > 0 {
                    for j in 0..n_features {
                        means[cluster][j] = sums[[cluster, j]] / counts[cluster] as f64;
                    }
                }
            }

            // Reassign labels
            let mut changed = 0;
            for i in 0..n_obs {
                let obs = observations.row(i).to_vec();
                let best = nearest_centroid(means.iter().map(|m| m.as_slice()), &obs);
                if best != labels[i] {
                    labels[i] = best;
                    changed += 1;
                }
            }

            if changed == 0 {
                break;
            }
        }
        debug!("k-means finished after {} iterations", iterations);

        let centroids = means;
        let mut sizes = vec![0usize; k];
        for &label in &labels {
            sizes[label] += 1;
        }
        info!("Clusterer trained: {} samples, k={}, sizes={:?}", n_obs, k, sizes);

        Ok(Fitted {
            model: Box::new(KMeansSegmentModel { centroids, scaler }),
            metrics: ModelMetrics {
                train_samples: n_obs,
                accuracy: None,
                clusters: Some(k),
            },
        })
    }

    fn decode(&self, payload: serde_json::Value) -> Result<Box<dyn SegmentModel>> {
        let model: KMeansSegmentModel = serde_json::from_value(payload)
            .map_err(|e| LearnerError::persistence(ModelSlot::Clusterer, e))?;
        if model.k() == 0 || model.centroids.iter().any(|c| c.len() != CandleFeatures::NUM_FEATURES) {
            return Err(LearnerError::persistence(ModelSlot::Clusterer, "malformed centroids"));
        }
        Ok(Box::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(level: f64, volume: f64) -> CandleFeatures {
        CandleFeatures { open: level, high: level + 1.0, low: level - 1.0, close: level, volume }
    }

    fn two_regimes() -> Vec<CandleFeatures> {
        let mut rows: Vec<CandleFeatures> = (0..10).map(|i| point(100.0 + i as f64 * 0.1, 10.0)).collect();
        rows.extend((0..10).map(|i| point(500.0 + i as f64 * 0.1, 900.0)));
        rows
    }

    #[test]
    fn test_separates_obvious_groups() {
        let fitted = KMeansBackend::default().fit(&two_regimes(), 2).unwrap();
        assert_eq!(fitted.metrics.clusters, Some(2));

        let low = fitted.model.assign(&point(100.5, 10.0));
        let high = fitted.model.assign(&point(500.5, 900.0));
        assert_ne!(low, high);
        assert!(low < 2 && high < 2);
        assert_eq!(fitted.model.first_id(), 0);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let backend = KMeansBackend::default();
        let a = backend.fit(&two_regimes(), 3).unwrap();
        let b = backend.fit(&two_regimes(), 3).unwrap();
        assert_eq!(a.model.encode().unwrap(), b.model.encode().unwrap());
    }

    #[test]
    fn test_too_few_samples_fails() {
        let err = KMeansBackend::default().fit(&two_regimes()[..3], 5).err().unwrap();
        assert!(matches!(err, LearnerError::TrainingFailure { slot: ModelSlot::Clusterer, .. }));
    }

    #[test]
    fn test_decode_round_trip_keeps_assignments() {
        let backend = KMeansBackend::default();
        let fitted = backend.fit(&two_regimes(), 2).unwrap();
        let decoded = backend.decode(fitted.model.encode().unwrap()).unwrap();
        for row in two_regimes() {
            assert_eq!(fitted.model.assign(&row), decoded.assign(&row));
        }
    }
}
