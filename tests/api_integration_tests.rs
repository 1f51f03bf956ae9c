//! Integration Tests for the HTTP front
//!
//! Full request/response cycle over a temporary asset directory.

use std::io::Read;

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use asset_cache::{api::create_router, AppState, Config, Coordinator};
use flate2::read::GzDecoder;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

// == Helper Functions ==

const CSS: &str = "body { color: red; }\nbody { color: red; }\n";

fn create_test_app() -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("site.css"), CSS).unwrap();

    let config = Config {
        asset_root: dir.path().to_path_buf(),
        ..Config::default()
    };
    let app = create_router(AppState::new(Coordinator::new(config)));
    (app, dir)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_to_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// == Asset Tests ==

#[tokio::test]
async fn test_asset_served_plain() {
    let (app, _dir) = create_test_app();

    let response = app.oneshot(get("/site.css")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
    assert!(response.headers().contains_key(header::ETAG));
    assert!(!response.headers().contains_key(header::CONTENT_ENCODING));
    assert_eq!(body_bytes(response).await, CSS.as_bytes());
}

#[tokio::test]
async fn test_asset_served_gzip() {
    let (app, _dir) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/site.css")
                .header(header::ACCEPT_ENCODING, "gzip, deflate, br")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");

    let compressed = body_bytes(response).await;
    let mut decoded = String::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_string(&mut decoded)
        .unwrap();
    assert_eq!(decoded, CSS);
}

#[tokio::test]
async fn test_conditional_get_returns_304() {
    let (app, _dir) = create_test_app();

    let response = app.clone().oneshot(get("/site.css")).await.unwrap();
    let etag = response.headers()[header::ETAG].to_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/site.css")
                .header(header::IF_NONE_MATCH, &etag)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert!(body_bytes(response).await.is_empty());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/site.css")
                .header(header::IF_NONE_MATCH, "stale")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_asset_returns_404() {
    let (app, _dir) = create_test_app();

    let response = app.oneshot(get("/missing.js")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert_eq!(body, "The file at URL /missing.js does not exist.");
}

// == Admin Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _dir) = create_test_app();

    let response = app.oneshot(get("/_cache/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert!(json.get("timestamp").is_some());
}

#[tokio::test]
async fn test_stats_track_hits_and_misses() {
    let (app, _dir) = create_test_app();

    app.clone().oneshot(get("/site.css")).await.unwrap();
    app.clone().oneshot(get("/site.css")).await.unwrap();

    let response = app.oneshot(get("/_cache/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response).await;
    assert_eq!(json["misses"], 1);
    assert_eq!(json["hits"], 1);
    // a plain request leaves the compressed form unbuilt
    assert_eq!(json["total_entries"], 1);
}

#[tokio::test]
async fn test_clear_endpoint_forces_miss() {
    let (app, _dir) = create_test_app();

    app.clone().oneshot(get("/site.css")).await.unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/_cache/entries?url=/site.css")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response).await;
    assert_eq!(json["cleared"], true);

    app.clone().oneshot(get("/site.css")).await.unwrap();
    let json = body_to_json(app.oneshot(get("/_cache/stats")).await.unwrap()).await;
    assert_eq!(json["misses"], 2);
    assert_eq!(json["hits"], 0);
}

#[tokio::test]
async fn test_put_endpoint_installs_content() {
    let (app, _dir) = create_test_app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/_cache/entries")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"url":"/generated.js","content":"console.log(1);","mime":"text/javascript"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response).await;
    assert_eq!(json["encodings"], serde_json::json!(["plain", "gzip"]));

    let response = app.oneshot(get("/generated.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/javascript");
    assert_eq!(body_bytes(response).await, b"console.log(1);");
}

#[tokio::test]
async fn test_put_endpoint_missing_file_is_404() {
    let (app, _dir) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/_cache/entries")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"url":"/nope.css"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("/nope.css"));
}
