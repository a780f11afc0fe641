//! JWKS-backed bearer token verification.
//!
//! The key set is fetched lazily on the first verification and then kept
//! read-only for the life of the process. A failed fetch leaves the cache
//! empty, so the next request tries again.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::OnceCell;

use super::{AuthError, AuthVerifier, SubjectId};
use crate::config::AuthConfig;

/// Signature algorithms accepted from a published key set.
const ACCEPTED_ALGORITHMS: [Algorithm; 9] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
}

/// Verifies bearer JWTs against a remote JSON Web Key Set.
pub struct JwksVerifier {
    client: reqwest::Client,
    jwks_url: String,
    issuer: Option<String>,
    audience: Vec<String>,
    leeway_secs: u64,
    keys: OnceCell<JwkSet>,
}

impl JwksVerifier {
    pub fn new(client: reqwest::Client, config: &AuthConfig) -> Self {
        Self {
            client,
            jwks_url: config.jwks_url.clone(),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            leeway_secs: config.leeway_secs,
            keys: OnceCell::new(),
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    async fn key_set(&self) -> Result<&JwkSet, AuthError> {
        self.keys.get_or_try_init(|| self.fetch_key_set()).await
    }

    async fn fetch_key_set(&self) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                tracing::error!(url = %self.jwks_url, error = %e, "Failed to fetch JWKS");
                AuthError::KeySetUnavailable(e.to_string())
            })?;

        let key_set: JwkSet = response.json().await.map_err(|e| {
            tracing::error!(url = %self.jwks_url, error = %e, "Failed to parse JWKS");
            AuthError::KeySetUnavailable(e.to_string())
        })?;

        tracing::info!(url = %self.jwks_url, keys = key_set.keys.len(), "Loaded JWKS");
        Ok(key_set)
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.leeway_secs;
        validation.validate_nbf = true;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        if self.audience.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.audience);
        }
        validation
    }
}

/// Pick the verification key for a token.
///
/// A token without `kid` is only accepted against a single-key set.
fn select_key<'a>(key_set: &'a JwkSet, kid: Option<&str>) -> Result<&'a Jwk, AuthError> {
    match kid {
        Some(kid) => key_set.find(kid).ok_or_else(|| {
            tracing::debug!(kid = %kid, "No JWKS key matches token kid");
            AuthError::UntrustedKey
        }),
        None if key_set.keys.len() == 1 => Ok(&key_set.keys[0]),
        None => Err(AuthError::Malformed("token header has no kid".to_string())),
    }
}

/// Check the token's algorithm against the allow-list and the key itself.
fn check_algorithm(jwk: &Jwk, algorithm: Algorithm) -> Result<(), AuthError> {
    if !ACCEPTED_ALGORITHMS.contains(&algorithm) {
        return Err(AuthError::Rejected(format!(
            "algorithm {:?} is not accepted",
            algorithm
        )));
    }
    if matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_)) {
        return Err(AuthError::Rejected("symmetric keys are not accepted".to_string()));
    }
    if let Some(declared) = &jwk.common.key_algorithm {
        if format!("{:?}", declared) != format!("{:?}", algorithm) {
            return Err(AuthError::Rejected(format!(
                "token algorithm {:?} does not match key algorithm {:?}",
                algorithm, declared
            )));
        }
    }
    Ok(())
}

fn map_jwt_error(error: jsonwebtoken::errors::Error) -> AuthError {
    match error.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::UntrustedKey,
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => AuthError::Malformed(error.to_string()),
        _ => AuthError::Rejected(error.to_string()),
    }
}

#[async_trait::async_trait]
impl AuthVerifier for JwksVerifier {
    async fn verify(&self, credential: &str) -> Result<SubjectId, AuthError> {
        let header = decode_header(credential).map_err(map_jwt_error)?;
        let key_set = self.key_set().await?;

        let jwk = select_key(key_set, header.kid.as_deref())?;
        check_algorithm(jwk, header.alg)?;

        let key = DecodingKey::from_jwk(jwk)
            .map_err(|e| AuthError::Rejected(format!("unusable key: {}", e)))?;

        let data = decode::<Claims>(credential, &key, &self.validation(header.alg))
            .map_err(map_jwt_error)?;

        match data.claims.sub {
            Some(sub) if !sub.is_empty() => Ok(SubjectId::new(sub)),
            _ => Err(AuthError::Rejected("token has no subject".to_string())),
        }
    }
}
