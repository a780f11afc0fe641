//! Bearer credential verification.
//!
//! The HTTP layer extracts the credential with [`bearer_token`] and hands it
//! to an [`AuthVerifier`]; nothing downstream runs unless that succeeds.

pub mod jwks;

use axum::http::{header, HeaderMap};

pub use jwks::JwksVerifier;

/// Verified subject of a bearer token (the `sub` claim).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reasons a request is not authenticated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer credential")]
    MissingCredential,

    #[error("Malformed bearer credential: {0}")]
    Malformed(String),

    #[error("Credential has expired")]
    Expired,

    #[error("Credential is not signed by a trusted key")]
    UntrustedKey,

    #[error("Credential rejected: {0}")]
    Rejected(String),

    /// The key set could not be fetched; says nothing about the credential.
    #[error("Signing keys unavailable: {0}")]
    KeySetUnavailable(String),
}

/// Something that can turn a bearer credential into a verified subject.
#[async_trait::async_trait]
pub trait AuthVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<SubjectId, AuthError>;
}

/// Extract the token from an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredential)?;

    let value = value
        .to_str()
        .map_err(|_| AuthError::Malformed("authorization header is not ASCII".to_string()))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| AuthError::Malformed("expected 'Bearer <token>'".to_string()))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::Malformed(format!(
            "unsupported authorization scheme '{}'",
            scheme
        )));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::Malformed("empty bearer token".to_string()));
    }

    Ok(token)
}
