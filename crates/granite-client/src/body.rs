//! Response body tracking.
//!
//! [`BodyTracker`] wraps a streaming response body so the observability
//! layer learns how many bytes were transferred and when the transfer
//! finished. The completion callback fires exactly once, on EOF, on a read
//! error, or when the body is dropped mid-stream — whichever comes first.

use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use granite_core::ByteStream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Callback invoked when the body transfer ends: `(bytes_read, error)`.
pub type OnBodyEnd = Box<dyn FnOnce(u64, Option<String>) + Send>;

/// Wraps a response stream to count bytes and signal end-of-transfer.
pub struct BodyTracker {
    inner: ByteStream,
    bytes_read: u64,
    finished: bool,
    on_end: Option<OnBodyEnd>,
}

impl BodyTracker {
    pub fn new<F>(inner: ByteStream, on_end: F) -> Self
    where
        F: FnOnce(u64, Option<String>) + Send + 'static,
    {
        Self {
            inner,
            bytes_read: 0,
            finished: false,
            on_end: Some(Box::new(on_end)),
        }
    }

    /// Bytes observed so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Boxes the tracker back into a [`ByteStream`].
    pub fn into_stream(self) -> ByteStream {
        Box::pin(self)
    }

    fn finish(&mut self, error: Option<String>) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(on_end) = self.on_end.take() {
            on_end(self.bytes_read, error);
        }
    }
}

impl Stream for BodyTracker {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes_read += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.finish(Some(err.to_string()));
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.finish(None);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for BodyTracker {
    fn drop(&mut self) {
        // An abandoned body still ends the span; the byte count reflects
        // what was actually read.
        self.finish(None);
    }
}
