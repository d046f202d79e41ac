//! Response body that tees its bytes into the outbox.
//!
//! Frames pass through to the client untouched. The copy is handed to a
//! [`PendingAppend`] exactly once, when the stream ends. A stream that
//! errors or is dropped before its end produces no record.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use http_body::{Body as HttpBody, Frame, SizeHint};

use super::middleware::PendingAppend;

pub(crate) struct CaptureBody {
    inner: Body,
    buffer: BytesMut,
    limit: usize,
    overflowed: bool,
    pending: Option<PendingAppend>,
}

impl CaptureBody {
    pub(crate) fn new(inner: Body, limit: usize, pending: PendingAppend) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            limit,
            overflowed: false,
            pending: Some(pending),
        }
    }

    fn capture(&mut self, chunk: &Bytes) {
        if self.overflowed {
            return;
        }
        if self.buffer.len() + chunk.len() > self.limit {
            tracing::debug!(
                limit = self.limit,
                "response exceeds capture limit; reconstructing from request"
            );
            self.overflowed = true;
            self.buffer = BytesMut::new();
            return;
        }
        self.buffer.extend_from_slice(chunk);
    }

    fn finish(&mut self) {
        if let Some(pending) = self.pending.take() {
            let captured = (!self.overflowed).then(|| std::mem::take(&mut self.buffer).freeze());
            pending.complete(captured);
        }
    }

    fn abandon(&mut self, reason: &str) {
        if let Some(pending) = self.pending.take() {
            tracing::debug!(
                route = %pending.route(),
                reason,
                "response not delivered; no outbox record"
            );
        }
    }
}

impl HttpBody for CaptureBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(chunk) = frame.data_ref() {
                    this.capture(chunk);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.abandon("body error");
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CaptureBody {
    fn drop(&mut self) {
        // The server may stop polling once the inner body reports its end.
        if self.inner.is_end_stream() {
            self.finish();
        } else {
            self.abandon("connection closed");
        }
    }
}
