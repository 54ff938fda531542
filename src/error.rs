use thiserror::Error;

use crate::db::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("concurrent update conflict on {0}")]
    ConcurrencyConflict(String),
    #[error("recording failed after {attempts} attempts: {last}")]
    RecordingFailed { attempts: u32, last: Box<EngineError> },
    #[error("no review item for learner {learner} and question {question}")]
    UnknownReviewItem { learner: String, question: String },
    #[error("unknown question {0}")]
    UnknownQuestion(String),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl EngineError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    /// Transient failures are worth another round of read-compute-write.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::ConcurrencyConflict(_)
        )
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { key } => Self::ConcurrencyConflict(key),
            StoreError::Unavailable(message) => Self::StorageUnavailable(message),
            StoreError::Sqlx(err) => Self::StorageUnavailable(err.to_string()),
            StoreError::Corrupt(message) => Self::InvariantViolation(message),
            StoreError::OutOfRange(message) => Self::InvalidInput(message),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_engine_taxonomy() {
        let conflict: EngineError = StoreError::Conflict {
            key: "mastery:u1:s1".to_string(),
        }
        .into();
        assert!(matches!(conflict, EngineError::ConcurrencyConflict(_)));
        assert!(conflict.is_retryable());

        let down: EngineError = StoreError::Unavailable("pool closed".to_string()).into();
        assert!(matches!(down, EngineError::StorageUnavailable(_)));
        assert!(down.is_retryable());

        let corrupt: EngineError = StoreError::Corrupt("ease out of range".to_string()).into();
        assert!(!corrupt.is_retryable());

        let too_big: EngineError = StoreError::OutOfRange("timeSpentMs".to_string()).into();
        assert!(matches!(too_big, EngineError::InvalidInput(_)));
        assert!(!too_big.is_retryable());
    }
}
