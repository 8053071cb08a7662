//! Gateway error taxonomy and its HTTP rendering.
//!
//! Every error reaches the caller as an `{"error": "<message>"}` body. The
//! status code of backend failures depends on the configured [`ErrorStyle`].

use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ErrorStyle;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Connection, timeout or decode failure talking to Ollama.
    #[error("Ollama request failed: {0}")]
    BackendUnavailable(String),

    /// Ollama answered with a non-200 status.
    #[error("Ollama returned status {status}: {message}")]
    BackendError { status: u16, message: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A single streamed chunk could not be relayed.
    #[error("Stream chunk error: {0}")]
    StreamChunk(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        let detail = if err.is_timeout() {
            format!("request timed out ({err})")
        } else if err.is_connect() {
            format!("connection failed ({err})")
        } else if err.is_decode() {
            format!("invalid response body ({err})")
        } else {
            err.to_string()
        };
        GatewayError::BackendUnavailable(detail)
    }
}

/// JSON error body shared by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl GatewayError {
    /// HTTP status for this error under the given convention.
    pub fn status_code(&self, style: ErrorStyle) -> StatusCode {
        match (self, style) {
            (GatewayError::Validation(_), _) => StatusCode::UNPROCESSABLE_ENTITY,
            (GatewayError::Unauthorized(_), _) => StatusCode::UNAUTHORIZED,
            (_, ErrorStyle::Embedded) => StatusCode::OK,
            (GatewayError::BackendError { .. }, ErrorStyle::Status) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            (GatewayError::BackendUnavailable(_), ErrorStyle::Status)
            | (GatewayError::StreamChunk(_), ErrorStyle::Status) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn to_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
        }
    }

    /// Render as an HTTP response using the given convention.
    pub fn into_response_with(self, style: ErrorStyle) -> Response {
        let status = self.status_code(style);
        let mut response = (status, Json(self.to_body())).into_response();

        if matches!(self, GatewayError::Unauthorized(_)) {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        response
    }
}
