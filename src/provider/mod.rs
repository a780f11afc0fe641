//! LLM completion provider abstraction.
//!
//! The relay only ever sees a [`CompletionProvider`]: something that turns a
//! [`Prompt`] into a lazy [`FragmentStream`]. Dropping the stream is the
//! cancellation signal, so implementations must tie every upstream resource
//! (sockets, tasks) to the stream value itself.

pub mod openai;
pub mod sse;
pub mod types;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub use openai::OpenAiProvider;

/// A lazy, single-pass sequence of reply fragments.
///
/// Items arrive in the order the model produced them. An `Err` item may
/// appear after any number of fragments; nothing is yielded after it.
pub type FragmentStream = BoxStream<'static, Result<String, ProviderError>>;

/// One `(role, content)` pair of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// An ordered, validated list of prompt messages.
///
/// Construction enforces that there is at least one message and that no
/// message has empty role or content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Prompt {
    messages: Vec<PromptMessage>,
}

impl Prompt {
    pub fn new(messages: Vec<PromptMessage>) -> Result<Self, PromptError> {
        if messages.is_empty() {
            return Err(PromptError::Empty);
        }
        for (index, message) in messages.iter().enumerate() {
            if message.role.trim().is_empty() {
                return Err(PromptError::EmptyRole { index });
            }
            if message.content.trim().is_empty() {
                return Err(PromptError::EmptyContent { index });
            }
        }
        Ok(Self { messages })
    }

    pub fn messages(&self) -> &[PromptMessage] {
        &self.messages
    }
}

/// Prompt invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("Prompt must contain at least one message")]
    Empty,

    #[error("Prompt message {index} has an empty role")]
    EmptyRole { index: usize },

    #[error("Prompt message {index} has empty content")]
    EmptyContent { index: usize },
}

/// Failures talking to the completion provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The request never produced a response (DNS, connect, TLS).
    #[error("Failed to reach provider: {0}")]
    Network(String),

    /// The provider answered with a non-success status before streaming.
    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider reported an error inside the event stream.
    #[error("Provider error: {0}")]
    Api(String),

    /// The response body broke off or could not be read.
    #[error("Provider stream interrupted: {0}")]
    Stream(String),

    /// The response body was readable but not in the expected shape.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// An LLM backend that can stream completions.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Open a streaming completion.
    ///
    /// Errors returned here happen before any fragment exists and can still
    /// be reported to the client with a proper status code.
    async fn stream(&self, prompt: &Prompt, model: &str) -> Result<FragmentStream, ProviderError>;

    /// Run a single-shot completion and return the whole reply.
    async fn complete(&self, prompt: &Prompt, model: &str) -> Result<String, ProviderError>;
}
