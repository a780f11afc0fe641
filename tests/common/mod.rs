//! Shared fakes for the integration tests.
//!
//! Verifiers and providers here stand in for the JWKS endpoint and the LLM
//! so the HTTP surface can be tested without network access.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::channel::{mpsc, oneshot};
use futures::stream::{self, StreamExt};

use ideastream::api::{create_router, AppState, RelaySettings};
use ideastream::auth::{AuthError, AuthVerifier, SubjectId};
use ideastream::provider::{
    CompletionProvider, FragmentStream, Prompt, PromptMessage, ProviderError,
};

pub const VALID_TOKEN: &str = "valid-token";
pub const EXPIRED_TOKEN: &str = "expired-token";
pub const TEST_SUBJECT: &str = "user_2abcdef";
pub const ROUTE: &str = "/api";

/// Accepts exactly [`VALID_TOKEN`].
#[derive(Default)]
pub struct StaticVerifier {
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl AuthVerifier for StaticVerifier {
    async fn verify(&self, credential: &str) -> Result<SubjectId, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match credential {
            VALID_TOKEN => Ok(SubjectId::new(TEST_SUBJECT)),
            EXPIRED_TOKEN => Err(AuthError::Expired),
            _ => Err(AuthError::UntrustedKey),
        }
    }
}

/// Verifier whose key set can never be loaded.
pub struct UnavailableVerifier;

#[async_trait::async_trait]
impl AuthVerifier for UnavailableVerifier {
    async fn verify(&self, _credential: &str) -> Result<SubjectId, AuthError> {
        Err(AuthError::KeySetUnavailable("connection refused".to_string()))
    }
}

/// Replays a fixed list of fragment results on every call.
pub struct ScriptedProvider {
    items: Vec<Result<String, ProviderError>>,
    pub calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(items: Vec<Result<&str, ProviderError>>) -> Self {
        Self {
            items: items
                .into_iter()
                .map(|r| r.map(str::to_string))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, _prompt: &Prompt, _model: &str) -> Result<FragmentStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(stream::iter(self.items.clone()).boxed())
    }

    async fn complete(&self, _prompt: &Prompt, _model: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .items
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .cloned()
            .collect())
    }
}

/// Provider that refuses to open a stream.
pub struct FailingProvider;

#[async_trait::async_trait]
impl CompletionProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn stream(&self, _prompt: &Prompt, _model: &str) -> Result<FragmentStream, ProviderError> {
        Err(ProviderError::Status {
            status: 503,
            body: "upstream overloaded".to_string(),
        })
    }

    async fn complete(&self, _prompt: &Prompt, _model: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Network("unreachable".to_string()))
    }
}

/// Sends `()` when dropped.
struct DropSignal(Option<oneshot::Sender<()>>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// Provider fed by the test through a channel, one stream only.
///
/// The returned receiver fires once the fragment stream has been dropped.
pub struct ChannelProvider {
    receiver: Mutex<Option<(mpsc::UnboundedReceiver<Result<String, ProviderError>>, DropSignal)>>,
}

impl ChannelProvider {
    pub fn new() -> (
        Self,
        mpsc::UnboundedSender<Result<String, ProviderError>>,
        oneshot::Receiver<()>,
    ) {
        let (tx, rx) = mpsc::unbounded();
        let (dropped_tx, dropped_rx) = oneshot::channel();
        let provider = Self {
            receiver: Mutex::new(Some((rx, DropSignal(Some(dropped_tx))))),
        };
        (provider, tx, dropped_rx)
    }
}

#[async_trait::async_trait]
impl CompletionProvider for ChannelProvider {
    fn name(&self) -> &str {
        "channel"
    }

    async fn stream(&self, _prompt: &Prompt, _model: &str) -> Result<FragmentStream, ProviderError> {
        let (rx, signal) = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ProviderError::Network("channel already used".to_string()))?;

        Ok(rx
            .map(move |item| {
                let _keep_alive = &signal;
                item
            })
            .boxed())
    }

    async fn complete(&self, _prompt: &Prompt, _model: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Network("not supported".to_string()))
    }
}

pub fn test_prompt() -> Prompt {
    Prompt::new(vec![PromptMessage::new("user", "Give me an idea")]).unwrap()
}

pub fn app_state(
    verifier: Arc<dyn AuthVerifier>,
    provider: Arc<dyn CompletionProvider>,
) -> AppState {
    AppState {
        verifier,
        provider,
        relay: Arc::new(RelaySettings {
            prompt: test_prompt(),
            model: "gpt-5-nano".to_string(),
        }),
    }
}

pub fn test_app(verifier: Arc<dyn AuthVerifier>, provider: Arc<dyn CompletionProvider>) -> axum::Router {
    create_router(app_state(verifier, provider), ROUTE)
}

/// Serve the app on a random local port.
pub async fn spawn_app(app: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    addr
}
