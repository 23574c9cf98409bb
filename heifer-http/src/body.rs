//! Response body produced by the server layer.
//!
//! ## Body States
//!
//! - **Passthrough**: the handler's body, forwarded untouched
//! - **Complete**: a buffered body, either collected from the handler for
//!   validator computation or produced by a short-circuit (304/400/412)
//! - **Errored**: collecting the handler's body failed; the error is yielded
//!   once so the caller sees the same failure it would without the cache

use bytes::{Buf, Bytes};
use http_body::{Body as HttpBody, Frame, SizeHint};
use pin_project::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

#[pin_project(project = CacheBodyProj)]
#[derive(Debug)]
pub enum CacheBody<B>
where
    B: HttpBody,
{
    /// Body was forwarded without reading.
    Passthrough(#[pin] B),

    /// Body was fully buffered.
    ///
    /// The `Option` is used to yield the data once, then end the stream.
    Complete(Option<Bytes>),

    /// Reading the body failed.
    Errored(Option<B::Error>),
}

impl<B: HttpBody> CacheBody<B> {
    pub fn empty() -> Self {
        CacheBody::Complete(None)
    }

    pub fn complete(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            CacheBody::Complete(None)
        } else {
            CacheBody::Complete(Some(bytes))
        }
    }
}

impl<B> HttpBody for CacheBody<B>
where
    B: HttpBody,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            CacheBodyProj::Passthrough(body) => match body.poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    let frame = frame.map_data(|mut data| data.copy_to_bytes(data.remaining()));
                    Poll::Ready(Some(Ok(frame)))
                }
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
            CacheBodyProj::Complete(data) => Poll::Ready(data.take().map(|bytes| Ok(Frame::data(bytes)))),
            CacheBodyProj::Errored(error) => Poll::Ready(error.take().map(Err)),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            CacheBody::Passthrough(body) => body.size_hint(),
            CacheBody::Complete(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            CacheBody::Complete(None) => SizeHint::with_exact(0),
            CacheBody::Errored(_) => SizeHint::default(),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CacheBody::Passthrough(body) => body.is_end_stream(),
            CacheBody::Complete(data) => data.is_none(),
            CacheBody::Errored(error) => error.is_none(),
        }
    }
}
