//! OpenAI-compatible chat-completions provider.

use std::collections::VecDeque;

use axum::http::header;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};

use super::sse::{ChunkDecoder, ChunkEvent};
use super::types::{ChatCompletionRequest, ChatCompletionResponse};
use super::{CompletionProvider, FragmentStream, Prompt, ProviderError};
use crate::config::{ApiKey, ProviderConfig};

/// Provider for OpenAI-compatible APIs.
///
/// The reqwest client is shared across requests; every call opens its own
/// upstream response, owned by the returned stream.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: ApiKey,
}

impl OpenAiProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: ApiKey) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Build a provider with its own client from the resolved config.
    ///
    /// Only a connect timeout is set: a total request timeout would cut
    /// long completions off mid-stream.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self::new(client, &config.base_url, config.api_key.clone()))
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Send the request and check the status, returning the live response.
    async fn send(
        &self,
        prompt: &Prompt,
        model: &str,
        streaming: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let body = ChatCompletionRequest {
            model,
            messages: prompt.messages(),
            stream: streaming,
        };

        let response = self
            .client
            .post(self.completions_url())
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to reach provider");
                ProviderError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Provider returned error");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

/// State threaded through the fragment stream.
struct DecodeState {
    upstream: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: ChunkDecoder,
    pending: VecDeque<ChunkEvent>,
    upstream_ended: bool,
    finished: bool,
}

/// Turn a raw SSE byte stream into fragments.
///
/// The byte stream is owned by the returned stream, so dropping the
/// fragments drops the upstream connection.
pub fn decode_fragments(upstream: BoxStream<'static, reqwest::Result<Bytes>>) -> FragmentStream {
    let state = DecodeState {
        upstream,
        decoder: ChunkDecoder::new(),
        pending: VecDeque::new(),
        upstream_ended: false,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            if let Some(event) = state.pending.pop_front() {
                match event {
                    ChunkEvent::Content(text) => return Some((Ok(text), state)),
                    ChunkEvent::Done => {
                        state.finished = true;
                        return None;
                    }
                    ChunkEvent::Failed(message) => {
                        state.finished = true;
                        return Some((Err(ProviderError::Api(message)), state));
                    }
                    ChunkEvent::Invalid(message) => {
                        state.finished = true;
                        return Some((Err(ProviderError::InvalidResponse(message)), state));
                    }
                }
            }

            if state.upstream_ended {
                if !state.decoder.done_received() {
                    tracing::debug!("Provider stream ended without [DONE]");
                }
                return None;
            }

            match state.upstream.next().await {
                Some(Ok(bytes)) => {
                    let events = state.decoder.process_chunk(&bytes);
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(ProviderError::Stream(e.to_string())), state));
                }
                None => {
                    let events = state.decoder.finish();
                    state.pending.extend(events);
                    state.upstream_ended = true;
                }
            }
        }
    })
    .boxed()
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream(&self, prompt: &Prompt, model: &str) -> Result<FragmentStream, ProviderError> {
        let response = self.send(prompt, model, true).await?;
        tracing::debug!(model = %model, "Opened provider stream");
        Ok(decode_fragments(response.bytes_stream().boxed()))
    }

    async fn complete(&self, prompt: &Prompt, model: &str) -> Result<String, ProviderError> {
        let response = self.send(prompt, model, false).await?;
        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if let Some(reason) = parsed.choices.first().and_then(|c| c.finish_reason.as_deref()) {
            tracing::debug!(finish_reason = %reason, "Completion finished");
        }

        parsed
            .content()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::InvalidResponse("response has no message content".into()))
    }
}
