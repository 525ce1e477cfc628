pub mod backend;
pub mod features;
pub mod kmeans;
pub mod model;
pub mod persistence;
pub mod registry;
pub mod tracker;

#[cfg(test)]
pub mod testing;

pub use backend::{ClassifierBackend, ClustererBackend, DirectionModel, DirectionPrediction, SegmentModel};
pub use features::{build_labeled_samples, build_unlabeled, CandleFeatures, LabeledSample};
pub use kmeans::KMeansBackend;
pub use model::LogisticBackend;
pub use persistence::{ModelMetrics, ModelSlot, ModelStore, ModelVersion};
pub use registry::ModelRegistry;
pub use tracker::AccuracyTracker;
