use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

/// Failure of an HTTP request, rendered as `{"message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// A 500 whose message is `"<context>: <error>"`.
    pub fn internal<E: std::fmt::Display>(context: &str, err: E) -> Self {
        ApiError::Internal(format!("{context}: {err}"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg,
        };
        if status.is_server_error() {
            tracing::error!("{message}");
        }

        (status, Json(json!({ "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_embeds_context() {
        let err = ApiError::internal("Failed to process query", "timeout");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(err, ApiError::Internal(ref m) if m == "Failed to process query: timeout"));
    }

    #[test]
    fn test_bad_request_status() {
        let res = ApiError::BadRequest("nope".into()).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
