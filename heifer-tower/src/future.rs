use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Future;
use futures::future::BoxFuture;
use heifer_http::CacheBody;
use http::Response;
use http_body::Body as HttpBody;
use pin_project::pin_project;

/// Future returned by [`ServerCacheService`](crate::ServerCacheService).
///
/// Wraps the boxed pipeline run: pre-check, handler call and post-check.
#[pin_project]
pub struct ServerCacheFuture<ResBody, E>
where
    ResBody: HttpBody,
{
    #[pin]
    inner: BoxFuture<'static, Result<Response<CacheBody<ResBody>>, E>>,
}

impl<ResBody, E> ServerCacheFuture<ResBody, E>
where
    ResBody: HttpBody,
{
    pub(crate) fn new(inner: BoxFuture<'static, Result<Response<CacheBody<ResBody>>, E>>) -> Self {
        Self { inner }
    }
}

impl<ResBody, E> Future for ServerCacheFuture<ResBody, E>
where
    ResBody: HttpBody,
{
    type Output = Result<Response<CacheBody<ResBody>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().inner.poll(cx)
    }
}
