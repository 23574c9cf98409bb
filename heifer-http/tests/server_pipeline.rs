use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use heifer::{ServerPolicy, Validator, ValidatorStore};
use heifer_http::headers::format_http_date;
use heifer_http::{ServerBefore, ServerPipeline, TemplatePatternProvider, ValidatorQuery};
use heifer_moka::MokaValidatorStore;
use http::header::{
    CACHE_CONTROL, ETAG, IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_UNMODIFIED_SINCE,
    LAST_MODIFIED, LOCATION, VARY,
};
use http::{Request, Response, StatusCode, request};
use pretty_assertions::assert_eq;

fn pipeline() -> (ServerPipeline, MokaValidatorStore) {
    let store = MokaValidatorStore::new(1_000);
    let pipeline = ServerPipeline::new(ServerPolicy::default(), Arc::new(store.clone()));
    (pipeline, store)
}

/// Runs one request, calling `handler` only when the pipeline proceeds.
async fn call<F>(pipeline: &ServerPipeline, request: Request<()>, handler: F) -> Response<Bytes>
where
    F: FnOnce() -> Response<Bytes>,
{
    let (parts, _) = request.into_parts();
    match pipeline.before(&parts).await.unwrap() {
        ServerBefore::Respond(response) => response,
        ServerBefore::Proceed(exchange) => pipeline.after(exchange, handler()).await.unwrap(),
    }
}

fn ok(headers: &[(http::header::HeaderName, &str)], body: &'static str) -> Response<Bytes> {
    let mut response = Response::builder().status(StatusCode::OK);
    for (name, value) in headers {
        response = response.header(name.clone(), *value);
    }
    response.body(Bytes::from_static(body.as_bytes())).unwrap()
}

fn unreachable_handler() -> Response<Bytes> {
    panic!("handler must not run")
}

const APRIL: &str = "Sun, 01 Apr 2018 00:00:00 GMT";

#[tokio::test]
async fn test_if_modified_since_short_circuits() {
    let (pipeline, _) = pipeline();
    call(&pipeline, Request::get("/api/cars/1").body(()).unwrap(), || {
        ok(&[(LAST_MODIFIED, APRIL)], "{\"id\":1}")
    })
    .await;

    for since in [APRIL, "Tue, 01 May 2018 00:00:00 GMT"] {
        let request = Request::get("/api/cars/1")
            .header(IF_MODIFIED_SINCE, since)
            .body(())
            .unwrap();
        let response = call(&pipeline, request, unreachable_handler).await;
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(response.body().is_empty());
        assert_eq!(response.headers().get(LAST_MODIFIED).unwrap(), APRIL);
    }

    let earlier = Request::get("/api/cars/1")
        .header(IF_MODIFIED_SINCE, "Thu, 01 Mar 2018 00:00:00 GMT")
        .body(())
        .unwrap();
    let response = call(&pipeline, earlier, || ok(&[(LAST_MODIFIED, APRIL)], "{\"id\":1}")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_if_match_mismatch_is_precondition_failed() {
    let (pipeline, store) = pipeline();
    call(&pipeline, Request::get("/api/cars/1").body(()).unwrap(), || {
        ok(&[(ETAG, "\"abc\"")], "{\"id\":1}")
    })
    .await;

    let stale_write = Request::put("/api/cars/1")
        .header(IF_MATCH, "\"nope\"")
        .body(())
        .unwrap();
    let response = call(&pipeline, stale_write, unreachable_handler).await;
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);

    let write = Request::put("/api/cars/1")
        .header(IF_MATCH, "\"abc\"")
        .body(())
        .unwrap();
    let response = call(&pipeline, write, || ok(&[], "")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.index().resources(), 0);
}

#[tokio::test]
async fn test_if_unmodified_since() {
    let (pipeline, _) = pipeline();
    call(&pipeline, Request::get("/api/cars/1").body(()).unwrap(), || {
        ok(&[(LAST_MODIFIED, APRIL)], "{}")
    })
    .await;

    let before_change = Request::delete("/api/cars/1")
        .header(IF_UNMODIFIED_SINCE, "Thu, 01 Mar 2018 00:00:00 GMT")
        .body(())
        .unwrap();
    let response = call(&pipeline, before_change, unreachable_handler).await;
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);

    let after_change = Request::delete("/api/cars/1")
        .header(IF_UNMODIFIED_SINCE, APRIL)
        .body(())
        .unwrap();
    let response = call(&pipeline, after_change, || ok(&[], "")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_contradictory_headers_are_bad_request() {
    let (pipeline, store) = pipeline();
    let request = Request::get("/api/cars/1")
        .header(IF_MATCH, "\"a\"")
        .header(IF_NONE_MATCH, "\"a\"")
        .body(())
        .unwrap();
    let response = call(&pipeline, request, unreachable_handler).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.entry_count(), 0);
}

#[tokio::test]
async fn test_digest_etag_and_advertised_headers() {
    let (pipeline, _) = pipeline();
    let response = call(&pipeline, Request::get("/api/cars").body(()).unwrap(), || {
        ok(&[], "hello")
    })
    .await;
    assert_eq!(
        response.headers().get(ETAG).unwrap(),
        "\"qvTGHdzF6KLavt4PO0gs2a6pQ00=\""
    );
    assert_eq!(
        response.headers().get(CACHE_CONTROL).unwrap(),
        "private, max-age=0, must-revalidate"
    );
    assert_eq!(response.headers().get(VARY).unwrap(), "accept");
}

#[tokio::test]
async fn test_late_validation_turns_response_into_304() {
    let (pipeline, _) = pipeline();
    let request = Request::get("/api/cars/1")
        .header(IF_NONE_MATCH, "W/\"v1\"")
        .body(())
        .unwrap();
    let response = call(&pipeline, request, || ok(&[(ETAG, "\"v1\"")], "{\"id\":1}")).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert!(response.body().is_empty());
    assert_eq!(response.headers().get(ETAG).unwrap(), "\"v1\"");
}

async fn is_cached(pipeline: &ServerPipeline, path: &str) -> bool {
    let request = Request::get(path)
        .header(IF_NONE_MATCH, "\"v\"")
        .body(())
        .unwrap();
    let (parts, _) = request.into_parts();
    matches!(
        pipeline.before(&parts).await.unwrap(),
        ServerBefore::Respond(_)
    )
}

#[tokio::test]
async fn test_post_with_location_invalidates_instance_and_collection() {
    let store = MokaValidatorStore::new(1_000);
    let routes = TemplatePatternProvider::new()
        .route("/api/x/{id?}")
        .unwrap()
        .route("/api/y/{id?}")
        .unwrap();
    let pipeline = ServerPipeline::new(ServerPolicy::default(), Arc::new(store.clone()))
        .with_routes(Arc::new(routes));

    for path in ["/api/x/7", "/api/x/8", "/api/x", "/api/y/1"] {
        call(&pipeline, Request::get(path).body(()).unwrap(), || {
            ok(&[(ETAG, "\"v\"")], "{}")
        })
        .await;
        assert!(is_cached(&pipeline, path).await, "{path} should be cached");
    }

    let create = Request::post("/api/x").body(()).unwrap();
    call(&pipeline, create, || {
        Response::builder()
            .status(StatusCode::CREATED)
            .header(LOCATION, "http://api.example/api/x/7")
            .body(Bytes::new())
            .unwrap()
    })
    .await;

    assert!(!is_cached(&pipeline, "/api/x/7").await);
    assert!(!is_cached(&pipeline, "/api/x").await);
    assert!(is_cached(&pipeline, "/api/x/8").await);
    assert!(is_cached(&pipeline, "/api/y/1").await);
}

#[tokio::test]
async fn test_restful_ancestors_are_invalidated() {
    let (pipeline, _) = pipeline();
    let child = "/api/parents/1/children/2";
    call(&pipeline, Request::get(child).body(()).unwrap(), || {
        ok(&[(ETAG, "\"v\"")], "{}")
    })
    .await;
    assert!(is_cached(&pipeline, child).await);

    call(&pipeline, Request::patch("/api/parents/1").body(()).unwrap(), || ok(&[], "")).await;
    assert!(!is_cached(&pipeline, child).await);
}

#[tokio::test]
async fn test_mutating_a_collection_keeps_sibling_collections() {
    let (pipeline, _) = pipeline();
    for path in ["/api/trucks/1", "/api/boats/9", "/api/cars/3"] {
        call(&pipeline, Request::get(path).body(()).unwrap(), || {
            ok(&[(ETAG, "\"v\"")], "{}")
        })
        .await;
    }

    let create = Request::post("/api/cars").body(()).unwrap();
    call(&pipeline, create, || {
        Response::builder()
            .status(StatusCode::CREATED)
            .header(LOCATION, "/api/cars/4")
            .body(Bytes::new())
            .unwrap()
    })
    .await;

    assert!(!is_cached(&pipeline, "/api/cars/3").await);
    assert!(is_cached(&pipeline, "/api/trucks/1").await);
    assert!(is_cached(&pipeline, "/api/boats/9").await);
}

#[tokio::test]
async fn test_query_strings_keep_their_own_validators() {
    let (pipeline, _) = pipeline();
    call(&pipeline, Request::get("/api/cars?page=1").body(()).unwrap(), || {
        ok(&[(ETAG, "\"v\"")], "[1]")
    })
    .await;
    assert!(is_cached(&pipeline, "/api/cars?page=1").await);
    assert!(!is_cached(&pipeline, "/api/cars?page=2").await);

    call(&pipeline, Request::delete("/api/cars").body(()).unwrap(), || ok(&[], "")).await;
    assert!(!is_cached(&pipeline, "/api/cars?page=1").await);
}

struct DatabaseTimestamp;

#[async_trait]
impl ValidatorQuery for DatabaseTimestamp {
    async fn current(&self, request: &request::Parts) -> Option<Validator> {
        (request.uri.path() == "/api/cars/1")
            .then(|| Validator::last_modified(Utc.with_ymd_and_hms(2018, 4, 1, 0, 0, 0).unwrap()))
    }
}

#[tokio::test]
async fn test_query_hook_supplies_missing_validator() {
    let (pipeline, store) = pipeline();
    let pipeline = pipeline.with_query(Arc::new(DatabaseTimestamp));
    let request = Request::get("/api/cars/1")
        .header(IF_MODIFIED_SINCE, format_http_date(Utc::now()))
        .body(())
        .unwrap();
    let response = call(&pipeline, request, unreachable_handler).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(response.headers().get(LAST_MODIFIED).unwrap(), APRIL);
    assert_eq!(store.entry_count(), 0);
}

#[tokio::test]
async fn test_stored_validator_is_what_the_handler_produced() {
    let (pipeline, store) = pipeline();
    call(&pipeline, Request::get("/api/cars/1").body(()).unwrap(), || {
        ok(&[(ETAG, "W/\"3\"")], "{}")
    })
    .await;
    store.run_pending_tasks().await;
    assert_eq!(store.entry_count(), 1);
    assert_eq!(store.index().resources(), 1);
    let identity = heifer::CacheIdentity::new("/api/cars/1", vec!["".into()], "default");
    assert_eq!(
        store.get(&identity).await.unwrap(),
        Some(Validator::etag(heifer::EntityTag::weak("3")))
    );
}
