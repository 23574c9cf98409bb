use std::fmt::Debug;
use std::task::{Context, Poll};

use futures::FutureExt;
use heifer::CacheError;
use heifer_http::{CacheBody, ServerBefore, ServerPipeline};
use http::{Request, Response, StatusCode};
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use tower::Service;
use tracing::error;

use crate::future::ServerCacheFuture;

/// Tower service running the server pipeline around `upstream`.
#[derive(Debug, Clone)]
pub struct ServerCacheService<S> {
    upstream: S,
    pipeline: ServerPipeline,
}

impl<S> ServerCacheService<S> {
    /// Wraps `upstream` with `pipeline`.
    pub fn new(upstream: S, pipeline: ServerPipeline) -> Self {
        Self { upstream, pipeline }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ServerCacheService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send,
    ReqBody: Send + 'static,
    ResBody: HttpBody + Send + 'static,
    ResBody::Data: Send,
    ResBody::Error: Debug + Send,
{
    type Response = Response<CacheBody<ResBody>>;
    type Error = S::Error;
    type Future = ServerCacheFuture<ResBody, S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.upstream.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // The ready service goes into the future; a fresh clone takes its place.
        let clone = self.upstream.clone();
        let mut upstream = std::mem::replace(&mut self.upstream, clone);
        let pipeline = self.pipeline.clone();

        let run = async move {
            let (parts, body) = req.into_parts();
            let exchange = match pipeline.before(&parts).await {
                Ok(ServerBefore::Respond(response)) => {
                    return Ok(response.map(CacheBody::complete));
                }
                Ok(ServerBefore::Proceed(exchange)) => exchange,
                Err(error) => return Ok(internal_error(error)),
            };

            let (mut parts, body) = match upstream.call(Request::from_parts(parts, body)).await {
                Ok(response) => response.into_parts(),
                Err(error) => return Err(error),
            };

            if !(exchange.needs_body() && parts.status.is_success()) {
                return Ok(match pipeline.after_unbuffered(exchange, &mut parts).await {
                    Ok(()) => Response::from_parts(parts, CacheBody::Passthrough(body)),
                    Err(error) => internal_error(error),
                });
            }

            let bytes = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(error) => {
                    error!(?error, "failed to read handler response body");
                    return Ok(Response::from_parts(parts, CacheBody::Errored(Some(error))));
                }
            };
            Ok(
                match pipeline
                    .after(exchange, Response::from_parts(parts, bytes))
                    .await
                {
                    Ok(response) => response.map(CacheBody::complete),
                    Err(error) => internal_error(error),
                },
            )
        };

        ServerCacheFuture::new(run.boxed())
    }
}

fn internal_error<B: HttpBody>(error: CacheError) -> Response<CacheBody<B>> {
    error!(%error, "server cache pipeline failed");
    let mut response = Response::new(CacheBody::empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
