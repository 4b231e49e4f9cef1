//! Error taxonomy for the API boundary.
//!
//! Every failure a handler can produce maps to exactly one variant, and every
//! variant maps to exactly one HTTP status. Internal detail is logged at the
//! boundary and never leaked to the caller.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed input; never retried, never silently corrected
    #[error("{0}")]
    Validation(String),

    /// Missing, malformed, or unknown bearer credential
    #[error("invalid or missing credential")]
    Unauthorized,

    /// Case-insensitive name collision at registration
    #[error("name '{0}' is already taken")]
    NameTaken(String),

    /// Fixed-window limit hit; `retry_after` is the window length in seconds
    #[error("rate limit exceeded")]
    RateLimited { retry_after: u64 },

    /// Live-feed admission refused because the global connection cap is reached
    #[error("server is at capacity")]
    AtCapacity,

    /// Anything from a backing collaborator; detail stays in the logs
    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NameTaken(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::AtCapacity => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::NameTaken(_) => "NAME_TAKEN",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::AtCapacity => "AT_CAPACITY",
            ApiError::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(detail, "internal error at API boundary");
        }

        let status = self.status();
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));

        match self {
            ApiError::RateLimited { retry_after } => (
                status,
                [(header::RETRY_AFTER, retry_after.to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::NameTaken("Bot1".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::RateLimited { retry_after: 60 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ApiError::AtCapacity.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_not_in_message() {
        let err = ApiError::Internal("connection refused to db".into());
        assert_eq!(err.to_string(), "internal error");
    }
}
