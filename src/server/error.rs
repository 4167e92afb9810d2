use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::warn;

use crate::core::relay::RelayError;
use crate::server::wire::ErrorBody;

/// Failure of a single HTTP request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The body failed validation; no provider call was made.
    #[error("{0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Provider(#[from] RelayError),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::MalformedRequest(_) => "malformed_request",
            ApiError::Provider(err) if err.is_timeout() => "provider_timeout",
            ApiError::Provider(_) => "provider_call_failure",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Provider(err) if err.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Provider(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::MalformedRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(kind = self.kind(), error = %self, "chat request failed");
        }
        let body = ErrorBody {
            kind: self.kind().to_string(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
