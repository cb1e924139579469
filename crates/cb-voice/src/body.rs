//! Response body that reports when it has been written out

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Bytes;
use http_body::{Body, Frame, SizeHint};
use tokio::sync::oneshot;

/// Single-chunk body that fires `on_flushed` once the connection has taken
/// the whole body, or when the body is dropped unsent
pub struct FlushNotifyBody {
    data: Option<Bytes>,
    len: u64,
    on_flushed: Option<oneshot::Sender<()>>,
}

impl FlushNotifyBody {
    pub fn new(data: impl Into<Bytes>, on_flushed: oneshot::Sender<()>) -> Self {
        let data = data.into();
        Self {
            len: data.len() as u64,
            data: Some(data),
            on_flushed: Some(on_flushed),
        }
    }

    fn notify(&mut self) {
        if let Some(tx) = self.on_flushed.take() {
            let _ = tx.send(());
        }
    }
}

impl Body for FlushNotifyBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match this.data.take() {
            Some(data) => Poll::Ready(Some(Ok(Frame::data(data)))),
            None => {
                this.notify();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.data.as_ref().map_or(0, |_| self.len))
    }
}

impl Drop for FlushNotifyBody {
    fn drop(&mut self) {
        self.notify();
    }
}
