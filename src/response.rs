use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::EngineError;

#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<SuccessResponse<T>> {
    Json(SuccessResponse { success: true, data })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    is_operational: bool,
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::CONFLICT, "CONFLICT", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    /// Store failures carry driver detail, so the message is logged, not returned.
    pub fn unavailable(code: &str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: code.to_string(),
            message: message.into(),
            is_operational: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn operational(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            is_operational: true,
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::InvalidInput(_) => Self::validation(message),
            EngineError::InvariantViolation(_) => {
                Self::operational(StatusCode::BAD_REQUEST, "INVARIANT_VIOLATION", message)
            }
            EngineError::UnknownReviewItem { .. } => {
                Self::operational(StatusCode::NOT_FOUND, "UNKNOWN_REVIEW_ITEM", message)
            }
            EngineError::UnknownQuestion(_) => {
                Self::operational(StatusCode::NOT_FOUND, "UNKNOWN_QUESTION", message)
            }
            EngineError::ConcurrencyConflict(_) => Self::conflict(message),
            EngineError::StorageUnavailable(_) => Self::unavailable("STORAGE_UNAVAILABLE", message),
            EngineError::RecordingFailed { .. } => Self::unavailable("RECORDING_FAILED", message),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = if self.is_operational {
            self.message
        } else {
            tracing::error!(code = %self.code, error = %self.message, "request failed");
            "service temporarily unavailable".to_string()
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: self.code,
        };

        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_statuses() {
        let cases = [
            (EngineError::invalid("x"), StatusCode::BAD_REQUEST),
            (EngineError::invariant("x"), StatusCode::BAD_REQUEST),
            (EngineError::UnknownQuestion("q".into()), StatusCode::NOT_FOUND),
            (
                EngineError::UnknownReviewItem {
                    learner: "u".into(),
                    question: "q".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (EngineError::ConcurrencyConflict("k".into()), StatusCode::CONFLICT),
            (EngineError::StorageUnavailable("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                EngineError::RecordingFailed {
                    attempts: 5,
                    last: Box::new(EngineError::StorageUnavailable("down".into())),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[tokio::test]
    async fn store_details_are_not_returned() {
        let err = AppError::from(EngineError::StorageUnavailable("pool timed out at 10.0.0.5".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "STORAGE_UNAVAILABLE");
        assert_eq!(body["error"], "service temporarily unavailable");
    }
}
