//! Error types for Polyroute
//!
//! All errors implement `IntoResponse` for Axum handlers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// A single provider's failure within a routing attempt
///
/// Collected into `AppError::AllProvidersFailed` so callers can see which
/// provider failed with which error instead of one flattened message.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderFailure {
    /// Name of the provider that failed
    pub provider: String,
    /// Error message reported by the provider
    pub reason: String,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.reason)
    }
}

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("No providers available for required capabilities [{required}]")]
    NoProviders { required: String },

    #[error("Provider {provider} failed: {reason}")]
    ProviderFailed { provider: String, reason: String },

    #[error("All {} attempted providers failed: {}", failures.len(), format_failures(failures))]
    AllProvidersFailed { failures: Vec<ProviderFailure> },

    #[error("Stream from {provider} failed: {reason}")]
    StreamFailed { provider: String, reason: String },

    #[error("Request cancelled by caller")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::NoProviders { .. } => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            Self::ProviderFailed { .. } => (StatusCode::BAD_GATEWAY, self.to_string()),
            Self::AllProvidersFailed { .. } => (StatusCode::BAD_GATEWAY, self.to_string()),
            Self::StreamFailed { .. } => (StatusCode::BAD_GATEWAY, self.to_string()),
            Self::Cancelled => (StatusCode::REQUEST_TIMEOUT, self.to_string()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = match &self {
            Self::AllProvidersFailed { failures } => Json(serde_json::json!({
                "error": message,
                "failures": failures,
            })),
            _ => Json(serde_json::json!({
                "error": message,
            })),
        };

        (status, body).into_response()
    }
}

impl AppError {
    /// Build a `NoProviders` error from a capability list
    pub fn no_providers<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: std::fmt::Display,
    {
        let required = required
            .into_iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self::NoProviders { required }
    }

    /// True for errors raised by caller cancellation rather than provider failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
