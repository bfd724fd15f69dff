use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tracing::debug;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Marks one open upstream connection. Dropping it releases the slot.
pub(crate) struct UpstreamLease {
    url: String,
    open: Arc<AtomicUsize>,
}

impl UpstreamLease {
    pub(crate) fn acquire(url: &str, open: Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        debug!("Opened upstream stream from {}", url);
        Self {
            url: url.to_string(),
            open,
        }
    }
}

impl Drop for UpstreamLease {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        debug!("Released upstream stream from {}", self.url);
    }
}

/// Upstream response body passed through chunk by chunk.
///
/// The upstream response is owned by `inner`, so it is closed whenever this
/// stream is dropped: after the last chunk, after a transfer error, or when
/// the downstream client goes away mid-transfer. The lease is given up as soon
/// as the stream yields its terminal item.
pub struct UpstreamStream {
    inner: ByteStream,
    lease: Option<UpstreamLease>,
}

impl UpstreamStream {
    pub(crate) fn new(response: reqwest::Response, lease: UpstreamLease) -> Self {
        Self {
            inner: Box::pin(response.bytes_stream()),
            lease: Some(lease),
        }
    }
}

impl Stream for UpstreamStream {
    type Item = Result<Bytes, reqwest::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.inner.as_mut().poll_next(cx);
        match &polled {
            Poll::Ready(None) => {
                self.lease.take();
            }
            Poll::Ready(Some(Err(e))) => {
                debug!("Upstream stream failed mid-transfer: {}", e);
                self.inner = Box::pin(futures::stream::empty::<Result<Bytes, reqwest::Error>>());
                self.lease.take();
            }
            _ => {}
        }
        polled
    }
}

impl std::fmt::Debug for UpstreamStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamStream")
            .field("open", &self.lease.is_some())
            .finish()
    }
}
