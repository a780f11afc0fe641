//! Integration tests for JWKS-backed token verification.
//!
//! Tokens are signed with the RSA keys in `tests/fixtures`; the matching
//! public key set is served by a wiremock server.

use jsonwebtoken::{encode, get_current_timestamp, Algorithm, EncodingKey, Header};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ideastream::auth::{AuthError, AuthVerifier, JwksVerifier};
use ideastream::config::{AuthConfig, KeySource};

const JWKS_PATH: &str = "/.well-known/jwks.json";
const KID: &str = "ins_test_key";
const SIGNING_KEY: &[u8] = include_bytes!("fixtures/signing_key.pem");
const UNTRUSTED_KEY: &[u8] = include_bytes!("fixtures/untrusted_key.pem");
const JWKS: &str = include_str!("fixtures/jwks.json");

fn jwks_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(JWKS, "application/json")
}

async fn jwks_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(jwks_response())
        .mount(&server)
        .await;
    server
}

fn auth_config(jwks_url: String) -> AuthConfig {
    AuthConfig {
        jwks_url,
        jwks_source: KeySource::Literal,
        issuer: None,
        audience: Vec::new(),
        leeway_secs: 0,
    }
}

fn verifier_for(server: &MockServer) -> JwksVerifier {
    verifier_with(auth_config(format!("{}{}", server.uri(), JWKS_PATH)))
}

fn verifier_with(config: AuthConfig) -> JwksVerifier {
    JwksVerifier::new(reqwest::Client::new(), &config)
}

fn sign(claims: serde_json::Value, key: &[u8], kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    encode(&header, &claims, &EncodingKey::from_rsa_pem(key).unwrap()).unwrap()
}

fn valid_claims() -> serde_json::Value {
    let now = get_current_timestamp();
    json!({
        "sub": "user_2abcdef",
        "iss": "https://clerk.example.dev",
        "iat": now,
        "exp": now + 300
    })
}

#[tokio::test]
async fn test_valid_token_yields_subject() {
    let server = jwks_server().await;
    let verifier = verifier_for(&server);

    let token = sign(valid_claims(), SIGNING_KEY, Some(KID));
    let subject = verifier.verify(&token).await.unwrap();

    assert_eq!(subject.as_str(), "user_2abcdef");
}

#[tokio::test]
async fn test_expired_token() {
    let server = jwks_server().await;
    let verifier = verifier_for(&server);

    let now = get_current_timestamp();
    let token = sign(
        json!({"sub": "user_2abcdef", "exp": now - 120}),
        SIGNING_KEY,
        Some(KID),
    );

    assert_eq!(verifier.verify(&token).await, Err(AuthError::Expired));
}

#[tokio::test]
async fn test_not_yet_valid_token_is_rejected() {
    let server = jwks_server().await;
    let verifier = verifier_for(&server);

    let now = get_current_timestamp();
    let token = sign(
        json!({"sub": "user_2abcdef", "nbf": now + 600, "exp": now + 900}),
        SIGNING_KEY,
        Some(KID),
    );

    assert!(matches!(
        verifier.verify(&token).await,
        Err(AuthError::Rejected(_))
    ));
}

#[tokio::test]
async fn test_token_signed_by_other_key() {
    let server = jwks_server().await;
    let verifier = verifier_for(&server);

    // Claims the trusted kid but was signed elsewhere
    let token = sign(valid_claims(), UNTRUSTED_KEY, Some(KID));

    assert_eq!(verifier.verify(&token).await, Err(AuthError::UntrustedKey));
}

#[tokio::test]
async fn test_unknown_kid() {
    let server = jwks_server().await;
    let verifier = verifier_for(&server);

    let token = sign(valid_claims(), SIGNING_KEY, Some("ins_rotated_away"));

    assert_eq!(verifier.verify(&token).await, Err(AuthError::UntrustedKey));
}

#[tokio::test]
async fn test_token_without_kid_uses_single_key() {
    let server = jwks_server().await;
    let verifier = verifier_for(&server);

    let token = sign(valid_claims(), SIGNING_KEY, None);

    assert!(verifier.verify(&token).await.is_ok());
}

#[tokio::test]
async fn test_garbage_credential_is_malformed() {
    let server = jwks_server().await;
    let verifier = verifier_for(&server);

    assert!(matches!(
        verifier.verify("not-a-jwt").await,
        Err(AuthError::Malformed(_))
    ));
}

#[tokio::test]
async fn test_token_without_subject_is_rejected() {
    let server = jwks_server().await;
    let verifier = verifier_for(&server);

    let now = get_current_timestamp();
    let token = sign(json!({"exp": now + 300}), SIGNING_KEY, Some(KID));

    assert!(matches!(
        verifier.verify(&token).await,
        Err(AuthError::Rejected(_))
    ));
}

#[tokio::test]
async fn test_issuer_is_enforced_when_configured() {
    let server = jwks_server().await;
    let token = sign(valid_claims(), SIGNING_KEY, Some(KID));

    let mut config = auth_config(format!("{}{}", server.uri(), JWKS_PATH));
    config.issuer = Some("https://clerk.example.dev".to_string());
    assert!(verifier_with(config.clone()).verify(&token).await.is_ok());

    config.issuer = Some("https://someone-else.example".to_string());
    assert!(matches!(
        verifier_with(config).verify(&token).await,
        Err(AuthError::Rejected(_))
    ));
}

#[tokio::test]
async fn test_audience_is_enforced_when_configured() {
    let server = jwks_server().await;
    let mut claims = valid_claims();
    claims["aud"] = json!("ideastream");
    let token = sign(claims, SIGNING_KEY, Some(KID));

    let mut config = auth_config(format!("{}{}", server.uri(), JWKS_PATH));
    config.audience = vec!["ideastream".to_string()];
    assert!(verifier_with(config.clone()).verify(&token).await.is_ok());

    config.audience = vec!["another-app".to_string()];
    assert!(matches!(
        verifier_with(config).verify(&token).await,
        Err(AuthError::Rejected(_))
    ));
}

#[tokio::test]
async fn test_key_set_is_fetched_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(jwks_response())
        .expect(1)
        .mount(&server)
        .await;
    let verifier = verifier_for(&server);

    for _ in 0..3 {
        let token = sign(valid_claims(), SIGNING_KEY, Some(KID));
        assert!(verifier.verify(&token).await.is_ok());
    }

    server.verify().await;
}

#[tokio::test]
async fn test_failed_fetch_is_retried_on_next_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(jwks_response())
        .mount(&server)
        .await;
    let verifier = verifier_for(&server);
    let token = sign(valid_claims(), SIGNING_KEY, Some(KID));

    assert!(matches!(
        verifier.verify(&token).await,
        Err(AuthError::KeySetUnavailable(_))
    ));
    assert!(verifier.verify(&token).await.is_ok());
}

#[tokio::test]
async fn test_invalid_key_set_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>oops</html>", "text/html"))
        .mount(&server)
        .await;
    let verifier = verifier_for(&server);
    let token = sign(valid_claims(), SIGNING_KEY, Some(KID));

    assert!(matches!(
        verifier.verify(&token).await,
        Err(AuthError::KeySetUnavailable(_))
    ));
}

#[tokio::test]
async fn test_unreachable_key_set() {
    // Nothing listens on port 1
    let verifier = verifier_with(auth_config("http://127.0.0.1:1/jwks.json".to_string()));
    let token = sign(valid_claims(), SIGNING_KEY, Some(KID));

    assert!(matches!(
        verifier.verify(&token).await,
        Err(AuthError::KeySetUnavailable(_))
    ));
}
