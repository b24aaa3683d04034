//! Request-level error taxonomy and its mapping to HTTP responses.
//!
//! Only the messages spelled out here ever reach a client. Detail from
//! upstream bodies, env lookups or internal failures goes to the log.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::config::ConfigError;
use crate::message::ErrorResponse;
use crate::services::completion::UpstreamError;
use crate::services::content_filter::ValidationError;

pub const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded. Please try again later.";
pub const CONFIGURATION_MESSAGE: &str = "Service temporarily unavailable";
pub const UPSTREAM_MESSAGE: &str = "Unable to process your request right now. Please try again.";
pub const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("rate limit exceeded for {client}")]
    RateLimited { client: String },

    #[error(transparent)]
    InvalidInput(#[from] ValidationError),

    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Upstream(UpstreamError),

    #[error("{0}")]
    Unexpected(String),
}

impl From<UpstreamError> for AppError {
    fn from(err: UpstreamError) -> Self {
        if err.is_upstream_failure() {
            AppError::Upstream(err)
        } else {
            AppError::Unexpected(err.to_string())
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) | AppError::Upstream(_) | AppError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The message a client is allowed to see.
    pub fn client_message(&self) -> String {
        match self {
            AppError::RateLimited { .. } => RATE_LIMITED_MESSAGE.to_string(),
            AppError::InvalidInput(e) => e.to_string(),
            AppError::Configuration(_) => CONFIGURATION_MESSAGE.to_string(),
            AppError::Upstream(_) => UPSTREAM_MESSAGE.to_string(),
            AppError::Unexpected(_) => UNEXPECTED_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(ErrorResponse::new(self.client_message()))).into_response()
    }
}
