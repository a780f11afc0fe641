//! HTTP request handlers.

use axum::{
    body::Body,
    extract::{Extension, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::server::{AppState, RequestId};
use crate::auth::{bearer_token, AuthError, AuthVerifier, SubjectId};
use crate::error::Error;
use crate::relay::{AbortReason, RelayStream, Session};

async fn authenticate(
    verifier: &dyn AuthVerifier,
    headers: &HeaderMap,
) -> Result<SubjectId, AuthError> {
    let credential = bearer_token(headers)?;
    verifier.verify(credential).await
}

fn event_stream_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    // Keep reverse proxies from buffering the stream
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    response
}

/// Handle GET on the streaming route.
///
/// Authentication and opening the provider stream both happen before the
/// response status is chosen, so their failures get a real error status.
/// Anything after that can only end the body early.
pub async fn stream_completion(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
) -> Result<Response, Error> {
    let mut session = Session::new(request_id.0);
    session.begin_authentication();

    let subject = match authenticate(state.verifier.as_ref(), &headers).await {
        Ok(subject) => subject,
        Err(e) => {
            tracing::info!(request_id = %request_id.0, error = %e, "Rejected unauthenticated request");
            session.abort(AbortReason::Unauthenticated);
            return Err(e.into());
        }
    };

    tracing::info!(
        request_id = %request_id.0,
        subject = %subject,
        model = %state.relay.model,
        "Authenticated request, opening provider stream"
    );
    session.authenticated(subject);

    let fragments = match state
        .provider
        .stream(&state.relay.prompt, &state.relay.model)
        .await
    {
        Ok(fragments) => fragments,
        Err(e) => {
            tracing::error!(request_id = %request_id.0, error = %e, "Failed to open provider stream");
            session.abort(AbortReason::ProviderError);
            return Err(e.into());
        }
    };

    let relay = RelayStream::new(fragments, session);
    Ok(event_stream_response(Body::from_stream(relay)))
}

/// Handle GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "ideastream"
    }))
}
