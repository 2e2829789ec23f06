//! Error types for pm-assist.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from the managed-backend client (auth + relational reads).
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend request failed: {0}")]
    Http(String),

    #[error("Token rejected by backend")]
    AuthRejected,

    #[error("Unexpected backend response: {0}")]
    Decode(String),

    #[error("Project {0} not found")]
    ProjectNotFound(String),
}

/// Per-request failures of the chat relay pipeline.
///
/// Every variant is terminal for the request it occurs in; the relay never
/// retries. Each maps to a stable HTTP status and a client-safe message —
/// upstream/backend detail is logged, not exposed.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Missing authorization header")]
    MissingAuth,

    #[error("Invalid or expired token")]
    InvalidAuth,

    #[error("Chat relay is not configured")]
    Misconfigured,

    #[error("rate limit exceeded, retry later")]
    RateLimited,

    #[error("Upstream quota exhausted")]
    QuotaExhausted,

    #[error("Upstream request failed")]
    UpstreamFailure,

    #[error("Context assembly failed: {0}")]
    ContextAssembly(#[from] BackendError),
}

impl RelayError {
    /// HTTP status surfaced to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingAuth | RelayError::InvalidAuth => StatusCode::UNAUTHORIZED,
            RelayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            RelayError::QuotaExhausted => StatusCode::PAYMENT_REQUIRED,
            RelayError::Misconfigured
            | RelayError::UpstreamFailure
            | RelayError::ContextAssembly(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-visible message. Generic for server-side failures so raw
    /// upstream/backend error text never leaks to the browser.
    pub fn client_message(&self) -> &'static str {
        match self {
            RelayError::MissingAuth => "missing authorization header",
            RelayError::InvalidAuth => "invalid or expired token",
            RelayError::Misconfigured => "chat assistant is not configured",
            RelayError::RateLimited => "rate limit exceeded, retry later",
            RelayError::QuotaExhausted => "upstream quota exhausted",
            RelayError::UpstreamFailure => "upstream request failed",
            RelayError::ContextAssembly(_) => "failed to assemble project context",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.client_message() }));
        (status, body).into_response()
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_error_status_mapping() {
        assert_eq!(RelayError::MissingAuth.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(RelayError::InvalidAuth.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            RelayError::RateLimited.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            RelayError::QuotaExhausted.status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            RelayError::UpstreamFailure.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RelayError::Misconfigured.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn rate_limit_message_is_the_literal_contract() {
        assert_eq!(
            RelayError::RateLimited.client_message(),
            "rate limit exceeded, retry later"
        );
    }

    #[test]
    fn context_assembly_message_hides_backend_detail() {
        let err = RelayError::ContextAssembly(BackendError::Http("connection refused".into()));
        assert_eq!(err.client_message(), "failed to assemble project context");
    }
}
