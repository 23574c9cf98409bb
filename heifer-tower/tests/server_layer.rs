use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use heifer::{
    CacheIdentity, RoutePattern, ServerPolicy, StoreError, StoreErrorPolicy, Validator,
    ValidatorStore,
};
use heifer_http::TemplatePatternProvider;
use heifer_tower::{ServerCache, ServerCacheService};
use http::header::{CACHE_CONTROL, ETAG, IF_MATCH, IF_NONE_MATCH, LOCATION, VARY};
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use pretty_assertions::assert_eq;
use tower::util::BoxCloneService;
use tower::{Layer, ServiceExt, service_fn};

type App = ServerCacheService<BoxCloneService<Request<String>, Response<Full<Bytes>>, Infallible>>;

/// A cars API counting how often the handler runs.
fn app(layer: &ServerCache, calls: Arc<AtomicUsize>) -> App {
    let handler = service_fn(move |request: Request<String>| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            let response = match *request.method() {
                Method::GET => Response::builder().body(Full::new(Bytes::from_static(b"[\"beetle\"]"))),
                Method::POST => Response::builder()
                    .status(StatusCode::CREATED)
                    .header(LOCATION, "/api/cars/7")
                    .body(Full::default()),
                _ => Response::builder()
                    .status(StatusCode::NO_CONTENT)
                    .body(Full::default()),
            };
            Ok::<_, Infallible>(response.unwrap())
        }
    });
    layer.layer(BoxCloneService::new(handler))
}

async fn send(app: &App, request: Request<String>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let (parts, body) = response.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    (parts.status, parts.headers, body)
}

fn request(method: Method, uri: &str) -> http::request::Builder {
    Request::builder().method(method).uri(uri)
}

#[tokio::test]
async fn test_conditional_get_skips_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(&ServerCache::builder().build(), calls.clone());

    let (status, headers, body) = send(&app, request(Method::GET, "/api/cars/1").body(String::new()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Bytes::from_static(b"[\"beetle\"]"));
    assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "private, max-age=0, must-revalidate");
    assert_eq!(headers.get(VARY).unwrap(), "accept");
    let etag = headers.get(ETAG).unwrap().clone();

    let (status, _, body) = send(
        &app,
        request(Method::GET, "/api/cars/1")
            .header(IF_NONE_MATCH, etag.clone())
            .body(String::new())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
    assert!(body.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_outdated_if_match_is_rejected() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(&ServerCache::builder().build(), calls.clone());
    send(&app, request(Method::GET, "/api/cars/1").body(String::new()).unwrap()).await;

    let (status, _, _) = send(
        &app,
        request(Method::PUT, "/api/cars/1")
            .header(IF_MATCH, "\"stale\"")
            .body("{}".to_owned())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mutation_drops_stored_validator() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(&ServerCache::builder().build(), calls.clone());
    let (_, headers, _) = send(&app, request(Method::GET, "/api/cars/1").body(String::new()).unwrap()).await;
    let etag = headers.get(ETAG).unwrap().clone();

    let (status, _, _) = send(&app, request(Method::PUT, "/api/cars/1").body("{}".to_owned()).unwrap()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Nothing stored any more: the handler runs, and since its body did not
    // change the response is still turned into a 304 afterwards.
    let (status, _, body) = send(
        &app,
        request(Method::GET, "/api/cars/1")
            .header(IF_NONE_MATCH, etag)
            .body(String::new())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
    assert!(body.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_created_location_is_invalidated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let routes = TemplatePatternProvider::new().route("/api/cars/{id?}").unwrap();
    let app = app(&ServerCache::builder().routes(routes).build(), calls.clone());
    let (_, headers, _) = send(&app, request(Method::GET, "/api/cars/7").body(String::new()).unwrap()).await;
    let etag = headers.get(ETAG).unwrap().clone();

    let (status, _, _) = send(&app, request(Method::POST, "/api/cars").body("{}".to_owned()).unwrap()).await;
    assert_eq!(status, StatusCode::CREATED);

    send(
        &app,
        request(Method::GET, "/api/cars/7")
            .header(IF_NONE_MATCH, etag)
            .body(String::new())
            .unwrap(),
    )
    .await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_contradictory_headers_are_rejected() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(&ServerCache::builder().build(), calls.clone());
    let (status, _, _) = send(
        &app,
        request(Method::GET, "/api/cars/1")
            .header(IF_MATCH, "\"a\"")
            .header(IF_NONE_MATCH, "\"a\"")
            .body(String::new())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

struct BrokenValidators;

fn down() -> StoreError {
    StoreError::Connection(Box::new(std::io::Error::other("down")))
}

#[async_trait]
impl ValidatorStore for BrokenValidators {
    async fn get(&self, _identity: &CacheIdentity) -> Result<Option<Validator>, StoreError> {
        Err(down())
    }

    async fn put(&self, _identity: &CacheIdentity, _validator: Validator) -> Result<(), StoreError> {
        Err(down())
    }

    async fn remove_by_identity(&self, _identity: &CacheIdentity) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn remove_by_resource_uri(&self, _resource_uri: &str) -> Result<usize, StoreError> {
        Err(down())
    }

    async fn remove_by_route_pattern(&self, _pattern: &RoutePattern) -> Result<usize, StoreError> {
        Err(down())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_store_failures_follow_policy() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let calls = Arc::new(AtomicUsize::new(0));
    let conditional = || {
        request(Method::GET, "/api/cars/1")
            .header(IF_NONE_MATCH, "\"abc\"")
            .body(String::new())
            .unwrap()
    };

    let ignoring = app(
        &ServerCache::builder().validators(BrokenValidators).build(),
        calls.clone(),
    );
    let (status, headers, _) = send(&ignoring, conditional()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key(ETAG));

    let policy = ServerPolicy {
        store_errors: StoreErrorPolicy::Propagate,
        ..ServerPolicy::default()
    };
    let propagating = app(
        &ServerCache::builder()
            .policy(policy)
            .validators(BrokenValidators)
            .build(),
        calls.clone(),
    );
    let (status, _, _) = send(&propagating, conditional()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
