// src/proxy/body.rs

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Bytes;
use http_body::{Body, Frame, SizeHint};
use tracing::warn;

/// Single-frame response body that reports when it was not fully delivered.
///
/// `written` counts bytes handed to the HTTP connection, not bytes that
/// reached the socket: hyper reports socket write failures to `axum::serve`,
/// which drops them. What this catches is a body dropped before its frame was
/// polled, e.g. a client that hung up after the headers. The status line is
/// already on the wire by then, so the shortfall can only be logged.
#[derive(Debug)]
pub struct CheckedBody {
    data: Option<Bytes>,
    total: usize,
    written: usize,
}

impl CheckedBody {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            total: data.len(),
            data: Some(data),
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl Body for CheckedBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.data.take() {
            Some(data) if !data.is_empty() => {
                self.written += data.len();
                Poll::Ready(Some(Ok(Frame::data(data))))
            }
            _ => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.data.as_ref().is_none_or(Bytes::is_empty)
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact((self.total - self.written) as u64)
    }
}

impl Drop for CheckedBody {
    fn drop(&mut self) {
        if self.written < self.total {
            warn!(
                written = self.written,
                total = self.total,
                "Only wrote {} of {} bytes to response",
                self.written,
                self.total
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::task::Waker;

    use super::*;

    fn poll(body: &mut CheckedBody) -> Option<Bytes> {
        let mut cx = Context::from_waker(Waker::noop());
        match Pin::new(body).poll_frame(&mut cx) {
            Poll::Ready(Some(Ok(frame))) => frame.into_data().ok(),
            _ => None,
        }
    }

    #[test]
    fn yields_the_whole_body_once() {
        let mut body = CheckedBody::new(&b"{\"ok\":true}"[..]);
        assert_eq!(body.size_hint().exact(), Some(11));

        assert_eq!(poll(&mut body).as_deref(), Some(&b"{\"ok\":true}"[..]));
        assert_eq!(body.written(), 11);
        assert!(body.is_end_stream());
        assert!(poll(&mut body).is_none());
    }

    #[test]
    fn empty_body_is_immediately_finished() {
        let body = CheckedBody::new(Bytes::new());
        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
    }
}
