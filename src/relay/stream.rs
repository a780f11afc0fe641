//! The relay body stream.
//!
//! [`RelayStream`] is handed to the HTTP runtime as the response body. The
//! runtime polls it only when it is ready to write more, so a slow client
//! slows down how fast fragments are pulled from the provider. Dropping the
//! body (client gone) drops the provider stream with it.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::wire::frame_fragment;
use super::{AbortReason, RelayState, Session};
use crate::provider::{FragmentStream, ProviderError};

/// Body stream relaying provider fragments as SSE events.
///
/// A provider error is held back for one poll. The runtime flushes what it
/// has buffered while the body is pending, so the status line and every
/// event already yielded reach the client before the connection is cut.
pub struct RelayStream {
    fragments: Option<FragmentStream>,
    pending_error: Option<ProviderError>,
    session: Session,
    fragments_seen: u64,
    bytes_sent: u64,
}

impl RelayStream {
    /// Start relaying. The session should already be in `Streaming`.
    pub fn new(fragments: FragmentStream, session: Session) -> Self {
        debug_assert_eq!(session.state(), &RelayState::Streaming);
        Self {
            fragments: Some(fragments),
            pending_error: None,
            session,
            fragments_seen: 0,
            bytes_sent: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Drop the provider stream, closing the upstream connection.
    fn release(&mut self) {
        self.fragments = None;
    }
}

impl Stream for RelayStream {
    type Item = Result<Bytes, ProviderError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if let Some(error) = this.pending_error.take() {
            return Poll::Ready(Some(Err(error)));
        }

        loop {
            let Some(fragments) = this.fragments.as_mut() else {
                return Poll::Ready(None);
            };

            match ready!(fragments.poll_next_unpin(cx)) {
                Some(Ok(fragment)) => {
                    this.fragments_seen += 1;
                    if let Some(event) = frame_fragment(&fragment) {
                        this.bytes_sent += event.len() as u64;
                        return Poll::Ready(Some(Ok(event)));
                    }
                }
                Some(Err(error)) => {
                    tracing::warn!(
                        request_id = %this.session.request_id(),
                        fragments = this.fragments_seen,
                        bytes = this.bytes_sent,
                        error = %error,
                        "Provider failed mid-stream, aborting response"
                    );
                    this.release();
                    this.session.abort(AbortReason::ProviderError);
                    this.pending_error = Some(error);
                    cx.waker().wake_by_ref();
                    return Poll::Pending;
                }
                None => {
                    tracing::debug!(
                        request_id = %this.session.request_id(),
                        fragments = this.fragments_seen,
                        bytes = this.bytes_sent,
                        "Provider stream exhausted"
                    );
                    this.release();
                    this.session.complete();
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl Drop for RelayStream {
    fn drop(&mut self) {
        if self.session.state() == &RelayState::Streaming {
            self.release();
            self.session.abort(AbortReason::ClientDisconnect);
        }
    }
}
