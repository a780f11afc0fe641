//! HTTP server setup and configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use reqwest::Client;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::handlers;
use crate::auth::{AuthVerifier, JwksVerifier};
use crate::config::Config;
use crate::provider::{CompletionProvider, OpenAiProvider, Prompt};

/// Response header carrying the request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Total timeout for fetching the JWKS document.
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Correlation id assigned to every request.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

/// What the relay sends upstream. Fixed for the life of the process.
#[derive(Debug)]
pub struct RelaySettings {
    pub prompt: Prompt,
    pub model: String,
}

/// Shared application state.
///
/// Every field is read-only after startup; concurrent requests share
/// nothing mutable.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<dyn AuthVerifier>,
    pub provider: Arc<dyn CompletionProvider>,
    pub relay: Arc<RelaySettings>,
}

async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let request_id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.0.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// Create the axum router with the streaming route and health check.
pub fn create_router(state: AppState, route: &str) -> Router {
    Router::new()
        .route(route, get(handlers::stream_completion))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(middleware::from_fn(assign_request_id))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.listen_addr()?;

    let jwks_client = Client::builder().timeout(JWKS_FETCH_TIMEOUT).build()?;
    let verifier = JwksVerifier::new(jwks_client, &config.auth);
    let provider = OpenAiProvider::from_config(&config.provider)?;

    tracing::info!(
        jwks_url = %verifier.jwks_url(),
        jwks_source = %config.auth.jwks_source,
        key_source = %config.provider.key_source,
        provider = %provider.name(),
        model = %config.provider.model,
        "Relay configured"
    );

    let state = AppState {
        verifier: Arc::new(verifier),
        provider: Arc::new(provider),
        relay: Arc::new(RelaySettings {
            prompt: config.prompt.clone(),
            model: config.provider.model.clone(),
        }),
    };

    let app = create_router(state, &config.server.route);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(
        address = %listen_addr,
        route = %config.server.route,
        "Starting ideastream server"
    );

    axum::serve(listener, app).await?;

    Ok(())
}
