pub mod controller;
pub mod learner;
pub mod observer;
pub mod policy;
pub mod sync;

pub use controller::{LoopController, LoopPhase, LoopState};
pub use learner::{BootstrapReport, IterationOutcome, OnlineLearner};
pub use observer::{FanoutSink, Observation, ObservationSink, TracingSink};
pub use policy::{should_retrain_classifier, should_retrain_clusterer, RetrainPolicy};
pub use sync::CandleSync;
