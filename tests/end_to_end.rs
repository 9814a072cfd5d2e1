//! Drives the gateway router against a local mock of the catalog and
//! delivery APIs.

use axum::{
    body::Body,
    extract::{Query as Params, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use figment::{providers::Serialized, Figment};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use track_gateway::{config::Config, routes, AppState};

#[derive(Default)]
struct Upstream {
    searches: Mutex<Vec<String>>,
    deliveries: AtomicUsize,
}

impl Upstream {
    fn searches_for(&self, query: &str) -> usize {
        self.searches
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.as_str() == query)
            .count()
    }

    fn total_searches(&self) -> usize {
        self.searches.lock().unwrap().len()
    }
}

async fn catalog(
    State(upstream): State<Arc<Upstream>>,
    Params(params): Params<HashMap<String, String>>,
) -> Response {
    let query = params.get("s").cloned().unwrap_or_default();
    upstream.searches.lock().unwrap().push(query.clone());

    let items = match query.as_str() {
        "Hello" => json!([
            {"id": 101, "audioQuality": "LOSSLESS"},
            {"id": 102, "audioQuality": "LOSSLESS"}
        ]),
        "Slow" => {
            tokio::time::sleep(Duration::from_millis(200)).await;
            json!([{"id": 301, "audioQuality": "HI_RES_LOSSLESS"}])
        }
        "Unlucky" => json!([
            {"id": 201, "audioQuality": "LOSSLESS"},
            {"id": 202, "audioQuality": "LOSSLESS"}
        ]),
        "Broken" => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
        "Garbled" => return "<html>oops</html>".into_response(),
        _ => json!([]),
    };
    Json(json!({"limit": 25, "offset": 0, "items": items})).into_response()
}

async fn delivery(
    State(upstream): State<Arc<Upstream>>,
    Params(params): Params<HashMap<String, String>>,
) -> Response {
    upstream.deliveries.fetch_add(1, Ordering::SeqCst);
    let id = params.get("id").map(String::as_str).unwrap_or_default();
    match id {
        "102" => Json(json!([
            {"OriginalTrackUrl": ""},
            {"OriginalTrackUrl": "https://cdn/102.flac"}
        ]))
        .into_response(),
        "301" => Json(json!([{"OriginalTrackUrl": "https://cdn/301.flac"}])).into_response(),
        "201" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn setup() -> (Router, Arc<Upstream>) {
    let upstream = Arc::new(Upstream::default());
    let mock = Router::new()
        .route("/search/", get(catalog))
        .route("/track/", get(delivery))
        .with_state(upstream.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, mock).await });

    let config = Config::from_figment(Figment::new().merge(Serialized::defaults(json!({
        "catalog_url": format!("http://{addr}/search/"),
        "delivery_url": format!("http://{addr}/track/"),
        "http_timeout_secs": 5,
        "resolve_timeout_secs": 10,
    }))))
    .unwrap();

    let state = AppState::new(&config, CancellationToken::new()).unwrap();
    (routes::router(Arc::new(state)), upstream)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_first_available_candidate_is_returned_and_cached() {
    let (app, upstream) = setup().await;

    let (status, body) = get_json(&app, "/search/Hello").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"url": "https://cdn/102.flac"}));
    assert_eq!(upstream.searches_for("Hello"), 1);
    assert!((1..=2).contains(&upstream.deliveries.load(Ordering::SeqCst)));

    // Let an aborted attempt that already reached the mock settle.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let deliveries = upstream.deliveries.load(Ordering::SeqCst);

    // Within the TTL window the answer comes from the cache.
    let (status, body) = get_json(&app, "/search/Hello").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"url": "https://cdn/102.flac"}));
    assert_eq!(upstream.total_searches(), 1);
    assert_eq!(upstream.deliveries.load(Ordering::SeqCst), deliveries);
}

#[tokio::test]
async fn test_normalized_query_shares_cache_entry() {
    let (app, upstream) = setup().await;

    let (status, _) = get_json(&app, "/search/Hello").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get_json(&app, "/search/Hello%20feat.%20Someone").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "https://cdn/102.flac");
    assert_eq!(upstream.total_searches(), 1);
}

#[tokio::test]
async fn test_empty_catalog_is_not_found_and_not_cached() {
    let (app, upstream) = setup().await;

    let (status, body) = get_json(&app, "/search/Obscure+Track").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
    assert_eq!(body["name"], "Not Found");
    assert!(body["description"].is_string());
    assert_eq!(upstream.deliveries.load(Ordering::SeqCst), 0);

    let (status, _) = get_json(&app, "/search/Obscure%20Track").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(upstream.searches_for("Obscure Track"), 2);
}

#[tokio::test]
async fn test_every_candidate_failing_is_not_found() {
    let (app, upstream) = setup().await;

    let (status, body) = get_json(&app, "/search/Unlucky").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
    assert_eq!(upstream.deliveries.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_catalog_failures_are_bad_gateway() {
    let (app, _upstream) = setup().await;

    for uri in ["/search/Broken", "/search/Garbled"] {
        let (status, body) = get_json(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], 502);
        assert_eq!(body["name"], "Bad Gateway");
        let description = body["description"].as_str().unwrap();
        assert!(!description.contains("503"));
        assert!(!description.contains("127.0.0.1"));
    }
}

#[tokio::test]
async fn test_invalid_queries_never_reach_upstream() {
    let (app, upstream) = setup().await;

    for uri in ["/search/%20%20", "/search/+", "/search/feat.%20Someone"] {
        let (status, body) = get_json(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["code"], 400);
    }
    assert_eq!(upstream.total_searches(), 0);
}

#[tokio::test]
async fn test_undecodable_path_gets_json_error_body() {
    let (app, upstream) = setup().await;

    let (status, body) = get_json(&app, "/search/%FF").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert_eq!(body["name"], "Bad Request");
    assert!(body["description"].is_string());
    assert_eq!(upstream.total_searches(), 0);
}

#[tokio::test]
async fn test_concurrent_identical_queries_are_coalesced() {
    let (app, upstream) = setup().await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        handles.push(tokio::spawn(
            async move { get_json(&app, "/search/Slow").await },
        ));
    }

    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"url": "https://cdn/301.flac"}));
    }
    assert_eq!(upstream.searches_for("Slow"), 1);
    assert_eq!(upstream.deliveries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_health_and_request_id() {
    let (app, _upstream) = setup().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "abc-123");

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}
