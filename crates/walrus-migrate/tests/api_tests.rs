//! HTTP surface tests driven through the router with `oneshot`.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::Engine;
use common::{MemoryBlobStore, MemoryConnector, MemorySource};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use walrus_migrate::api::{create_router, AppState, INLINE_DOWNLOAD_LIMIT};
use walrus_migrate::LocalIndex;

struct TestApp {
    router: axum::Router,
    index: Arc<LocalIndex>,
    dest: Arc<MemoryBlobStore>,
    _dir: TempDir,
}

fn app_with(source: MemorySource) -> TestApp {
    let dir = TempDir::new().unwrap();
    let index = Arc::new(LocalIndex::new(dir.path().join("index.json")));
    let dest = Arc::new(MemoryBlobStore::new());
    let connector = Arc::new(MemoryConnector {
        source: Arc::new(source),
    });
    let state = AppState::new(connector, dest.clone(), index.clone(), 5);
    TestApp {
        router: create_router(state),
        index,
        dest,
        _dir: dir,
    }
}

fn sample_source() -> MemorySource {
    MemorySource::new()
        .with_bucket("archive")
        .with_object("data/a.csv", 10)
        .with_object("data/b.tmp", 20)
        .with_object("logs/c.log", 30)
}

fn creds() -> Value {
    json!({"accessKeyId": "AKIATEST", "secretAccessKey": "secret"})
}

/// Helper to make JSON requests.
async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let app = app_with(MemorySource::new());
    let (status, body) = json_request(&app.router, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_proxy_requires_credentials() {
    let app = app_with(sample_source());
    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/s3/proxy",
        Some(json!({"action": "listBuckets", "credentials": {"accessKeyId": "AK"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "AWS credentials are required");
}

#[tokio::test]
async fn test_proxy_unknown_action() {
    let app = app_with(sample_source());
    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/s3/proxy",
        Some(json!({"action": "deleteBucket", "credentials": creds()})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown action: deleteBucket");
}

#[tokio::test]
async fn test_proxy_malformed_body() {
    let app = app_with(sample_source());
    let request = Request::builder()
        .method("POST")
        .uri("/api/s3/proxy")
        .header("Content-Type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid request body"));
}

#[tokio::test]
async fn test_proxy_list_buckets() {
    let app = app_with(sample_source());
    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/s3/proxy",
        Some(json!({"action": "listBuckets", "credentials": creds()})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], json!([{"name": "bkt"}, {"name": "archive"}]));
}

#[tokio::test]
async fn test_proxy_list_objects_needs_bucket() {
    let app = app_with(sample_source());
    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/s3/proxy",
        Some(json!({"action": "listObjects", "credentials": creds()})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bucket name is required");
}

#[tokio::test]
async fn test_proxy_list_objects_with_filter() {
    let app = app_with(sample_source());
    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/s3/proxy",
        Some(json!({
            "action": "listObjects",
            "credentials": creds(),
            "bucket": "bkt",
            "filter": {"prefix": "data/", "exclude": ["*.tmp"]}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let objects = body["data"].as_array().unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0]["key"], "data/a.csv");
    assert_eq!(objects[0]["size"], 10);
    assert_eq!(objects[0]["lastModified"], "2024-01-15T12:00:00Z");
}

#[tokio::test]
async fn test_proxy_list_objects_prefix_without_filter() {
    let app = app_with(sample_source());
    let (_, body) = json_request(
        &app.router,
        "POST",
        "/api/s3/proxy",
        Some(json!({
            "action": "listObjects",
            "credentials": creds(),
            "bucket": "bkt",
            "prefix": "logs/"
        })),
    )
    .await;
    let objects = body["data"].as_array().unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0]["key"], "logs/c.log");
}

#[tokio::test]
async fn test_proxy_download_small_object_inline() {
    let app = app_with(sample_source());
    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/s3/proxy",
        Some(json!({
            "action": "downloadObject",
            "credentials": creds(),
            "bucket": "bkt",
            "key": "data/a.csv"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["key"], "data/a.csv");
    assert_eq!(body["data"]["size"], 10);
    let data = base64::engine::general_purpose::STANDARD
        .decode(body["data"]["data"].as_str().unwrap())
        .unwrap();
    assert_eq!(data, vec![b'd'; 10]);
}

#[tokio::test]
async fn test_proxy_download_large_object_streams() {
    let size = INLINE_DOWNLOAD_LIMIT + 1;
    let app = app_with(MemorySource::new().with_object("big/video.mp4", size));

    let request = Request::builder()
        .method("POST")
        .uri("/api/s3/proxy")
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&json!({
                "action": "downloadObject",
                "credentials": creds(),
                "bucket": "bkt",
                "key": "big/video.mp4"
            }))
            .unwrap(),
        ))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(headers[header::CONTENT_LENGTH], size.to_string().as_str());
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"video.mp4\""
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(bytes.len() as u64, size);
}

#[tokio::test]
async fn test_proxy_download_requires_key() {
    let app = app_with(sample_source());
    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/s3/proxy",
        Some(json!({"action": "downloadObject", "credentials": creds(), "bucket": "bkt"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bucket and key are required");
}

#[tokio::test]
async fn test_proxy_download_missing_object() {
    let app = app_with(sample_source());
    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/s3/proxy",
        Some(json!({
            "action": "downloadObject",
            "credentials": creds(),
            "bucket": "bkt",
            "key": "nope"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_proxy_estimate_transfer() {
    let app = app_with(sample_source());
    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/s3/proxy",
        Some(json!({
            "action": "estimateTransfer",
            "credentials": creds(),
            "bucket": "bkt",
            "prefix": "data/"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["totalSize"], 30);
    assert_eq!(data["fileCount"], 2);
    assert_eq!(data["epochs"], 5);
    let expected = walrus_migrate::cost::estimate(10, 5).frost * 2;
    assert_eq!(data["estimatedCost"], expected);
}

#[tokio::test]
async fn test_transfer_mixed_results() {
    let app = app_with(sample_source());
    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/s3/transfer",
        Some(json!({
            "credentials": creds(),
            "bucket": "bkt",
            "keys": ["data/a.csv", "missing.bin"],
            "epochs": 0,
            "encrypt": false
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 2);

    assert_eq!(items[0]["key"], "data/a.csv");
    assert_eq!(items[0]["success"], true);
    assert_eq!(items[0]["size"], 10);
    assert_eq!(items[0]["expiryEpoch"], 105);
    assert_eq!(items[0]["registeredEpoch"], 100);
    assert_eq!(items[0]["suiObjectId"], "0xobject");
    assert!(items[0]["blobId"].is_string());

    assert_eq!(items[1]["key"], "missing.bin");
    assert_eq!(items[1]["success"], false);
    assert!(items[1]["error"].as_str().unwrap().contains("missing.bin"));

    assert_eq!(app.dest.stored(), 1);
    assert_eq!(
        app.index.get("a.csv").unwrap().blob_id,
        items[0]["blobId"].as_str().unwrap()
    );
}

#[tokio::test]
async fn test_transfer_requires_bucket() {
    let app = app_with(sample_source());
    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/s3/transfer",
        Some(json!({"credentials": creds(), "keys": ["a"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bucket name is required");
}

#[tokio::test]
async fn test_index_update() {
    let app = app_with(MemorySource::new());
    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/index/update",
        Some(json!({
            "fileName": "photo.png",
            "blobId": "B-web",
            "size": 2048,
            "expiryEpoch": 77
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success"}));

    let entry = app.index.get("photo.png").unwrap();
    assert_eq!(entry.blob_id, "B-web");
    assert_eq!(entry.size, 2048);
    assert_eq!(entry.expiry_epoch, 77);

    let reopened = LocalIndex::open(app.index.path());
    assert_eq!(reopened.len(), 1);
}

#[tokio::test]
async fn test_index_update_rejects_empty_blob_id() {
    let app = app_with(MemorySource::new());
    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/index/update",
        Some(json!({"fileName": "photo.png", "blobId": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(app.index.is_empty());
}
