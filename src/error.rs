use thiserror::Error;

use crate::ml::ModelSlot;

pub type Result<T> = std::result::Result<T, LearnerError>;

/// Errors raised by the learning core and its collaborators
#[derive(Error, Debug)]
pub enum LearnerError {
    /// Candle store could not be read; retried on the next iteration
    #[error("candle store unavailable: {0}")]
    StoreUnavailable(String),

    /// Prediction requested before the slot was trained or loaded
    #[error("{0} model not loaded")]
    ModelNotLoaded(ModelSlot),

    #[error("training {slot} model failed: {reason}")]
    TrainingFailure { slot: ModelSlot, reason: String },

    /// A durable write (cursor or model) did not complete
    #[error("failed to persist {target}: {reason}")]
    PersistenceFailure { target: String, reason: String },

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("exchange request failed: {0}")]
    Exchange(String),

    #[error("invalid candle: {0}")]
    InvalidCandle(String),
}

impl LearnerError {
    pub fn training(slot: ModelSlot, reason: impl ToString) -> Self {
        LearnerError::TrainingFailure { slot, reason: reason.to_string() }
    }

    pub fn persistence(target: impl ToString, reason: impl ToString) -> Self {
        LearnerError::PersistenceFailure {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Check if the loop should simply try again later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LearnerError::StoreUnavailable(_)
                | LearnerError::PersistenceFailure { .. }
                | LearnerError::TrainingFailure { .. }
                | LearnerError::Exchange(_)
        )
    }
}

impl From<sqlx::Error> for LearnerError {
    fn from(e: sqlx::Error) -> Self {
        LearnerError::StoreUnavailable(e.to_string())
    }
}

impl From<reqwest::Error> for LearnerError {
    fn from(e: reqwest::Error) -> Self {
        LearnerError::Exchange(e.to_string())
    }
}
