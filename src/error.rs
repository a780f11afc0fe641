//! Error types for ideastream.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::auth::AuthError;
use crate::provider::ProviderError;

/// Result type alias for ideastream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ideastream.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Provider(#[from] ProviderError),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Auth(AuthError::KeySetUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::Provider(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            Error::Auth(AuthError::KeySetUnavailable(_)) => "auth_unavailable",
            Error::Auth(_) => "authentication_error",
            Error::Provider(_) => "provider_error",
            Error::Config(_) => "server_error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // OpenAI-style error body
        let body = serde_json::json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
                "code": status.as_u16()
            }
        });

        let mut response = (status, axum::Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
