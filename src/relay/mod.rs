//! Streaming relay: provider fragments in, SSE events out.
//!
//! A [`Session`] tracks one request through
//! `Idle → Authenticating → Streaming → {Completed | Aborted}`. The HTTP
//! handler drives the first two steps; once the response status is
//! committed the session moves into a [`RelayStream`], which owns both the
//! provider stream and the session until a terminal state is reached.
//!
//! A provider error after streaming began cannot change the already-sent
//! `200 OK`. The relay ends the body with an error, the HTTP runtime aborts
//! the connection, and the client sees an incomplete response.

pub mod stream;
pub mod wire;

use std::time::Instant;

use uuid::Uuid;

use crate::auth::SubjectId;

pub use stream::RelayStream;
pub use wire::{frame_fragment, payload_lines};

/// Why a session ended without completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The credential was missing or rejected.
    Unauthenticated,
    /// The provider failed, before or during streaming.
    ProviderError,
    /// The client went away mid-stream.
    ClientDisconnect,
}

/// Lifecycle state of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Authenticating,
    Streaming,
    Completed,
    Aborted(AbortReason),
}

impl RelayState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayState::Completed | RelayState::Aborted(_))
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: &RelayState) -> bool {
        matches!(
            (self, next),
            (RelayState::Idle, RelayState::Authenticating)
                | (RelayState::Authenticating, RelayState::Streaming)
                | (RelayState::Authenticating, RelayState::Aborted(_))
                | (RelayState::Streaming, RelayState::Completed)
                | (RelayState::Streaming, RelayState::Aborted(_))
        )
    }
}

/// Per-request bookkeeping. Nothing in here outlives the request.
#[derive(Debug)]
pub struct Session {
    request_id: Uuid,
    subject: Option<SubjectId>,
    state: RelayState,
    started: Instant,
}

impl Session {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            subject: None,
            state: RelayState::Idle,
            started: Instant::now(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn subject(&self) -> Option<&SubjectId> {
        self.subject.as_ref()
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    pub fn begin_authentication(&mut self) {
        self.transition(RelayState::Authenticating);
    }

    /// Bind the verified subject and enter streaming.
    pub fn authenticated(&mut self, subject: SubjectId) {
        self.subject = Some(subject);
        self.transition(RelayState::Streaming);
    }

    pub fn complete(&mut self) {
        self.transition(RelayState::Completed);
    }

    pub fn abort(&mut self, reason: AbortReason) {
        self.transition(RelayState::Aborted(reason));
    }

    fn transition(&mut self, next: RelayState) {
        if !self.state.can_transition_to(&next) {
            tracing::warn!(
                request_id = %self.request_id,
                from = ?self.state,
                to = ?next,
                "Ignoring invalid relay state transition"
            );
            return;
        }

        tracing::debug!(
            request_id = %self.request_id,
            from = ?self.state,
            to = ?next,
            "Relay state transition"
        );
        self.state = next;

        if self.state.is_terminal() {
            self.log_outcome();
        }
    }

    fn log_outcome(&self) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let subject = self.subject.as_ref().map(SubjectId::as_str).unwrap_or("-");

        match &self.state {
            RelayState::Completed => tracing::info!(
                request_id = %self.request_id,
                subject = %subject,
                elapsed_ms,
                "Stream completed"
            ),
            RelayState::Aborted(AbortReason::ProviderError) => tracing::warn!(
                request_id = %self.request_id,
                subject = %subject,
                elapsed_ms,
                "Stream aborted by provider error"
            ),
            RelayState::Aborted(reason) => tracing::info!(
                request_id = %self.request_id,
                subject = %subject,
                elapsed_ms,
                reason = ?reason,
                "Stream aborted"
            ),
            _ => {}
        }
    }
}
