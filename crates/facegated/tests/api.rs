//! Router-level tests with a deterministic embedding source.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use facegate_core::testing::{strip_png, ColorFaces, BLACK};
use facegate_core::{FsBlobStore, ObjectBlobStore};
use object_store::memory::InMemory;
use facegated::{build_router, AppState, Config};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "facegate-test-boundary";
const RED: [u8; 3] = [255, 0, 0];
const GREEN: [u8; 3] = [0, 255, 0];
const BLUE: [u8; 3] = [0, 0, 255];

enum Part<'a> {
    Text(&'a str),
    File(&'a [u8]),
}

fn multipart_body(fields: &[(&str, Part<'_>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, part) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"face.png\"\r\n\
                         Content-Type: image/png\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn post_form(uri: &str, fields: &[(&str, Part<'_>)]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(fields)))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

struct TestApp {
    dir: TempDir,
    state: Arc<AppState>,
    router: Router,
}

fn new_app(max_upload_bytes: usize) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsBlobStore::new(dir.path()));
    let state = Arc::new(AppState::new(&Config::default(), store));
    let router = build_router(state.clone(), max_upload_bytes);
    TestApp { dir, state, router }
}

async fn ready_app(source: ColorFaces) -> TestApp {
    let app = new_app(10 * 1024 * 1024);
    app.state.install(Arc::new(source)).await.unwrap();
    app
}

async fn enroll(app: &TestApp, label: &str, image: &[u8]) -> (StatusCode, Value) {
    send(
        &app.router,
        post_form("/loadimages", &[("name", Part::Text(label)), ("image", Part::File(image))]),
    )
    .await
}

async fn verify(app: &TestApp, image: &[u8]) -> (StatusCode, Value) {
    send(&app.router, post_form("/api/verify-face", &[("image", Part::File(image))])).await
}

fn matches(body: &Value) -> Vec<String> {
    body["matches"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_banner_and_health_answer_before_ready() {
    let app = new_app(1024);

    let response = app.router.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&text).starts_with("facegated"));

    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app.router, get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["phase"], "uninitialized");
}

#[tokio::test]
async fn test_upload_and_verify_are_503_until_ready() {
    let app = new_app(1024 * 1024);
    let image = strip_png(&[RED]);

    let (status, body) = enroll(&app, "alice", &image).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "service not ready: uninitialized");

    let (status, _) = verify(&app, &image).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_empty_store_verifies_as_unknown() {
    let app = ready_app(ColorFaces::new()).await;

    let (status, body) = send(&app.router, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);

    let (status, body) = verify(&app, &strip_png(&[RED])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(matches(&body), vec!["unknown"]);
}

#[tokio::test]
async fn test_enrolled_face_verifies_at_distance_zero() {
    let app = ready_app(ColorFaces::new()).await;
    let image = strip_png(&[RED]);

    let (status, body) = enroll(&app, "alice", &image).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Image uploaded successfully");
    assert_eq!(body["folder"], "alice");
    assert_eq!(body["version"], 2);

    let file = body["file"].as_str().unwrap();
    assert!(app.dir.path().join("alice").join(file).is_file());

    let (status, body) = verify(&app, &image).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(matches(&body), vec!["alice (distance: 0.00)"]);
    assert_eq!(body["results"][0]["kind"], "known");
}

#[tokio::test]
async fn test_object_store_backend_serves_enroll_and_verify() {
    let backend = Arc::new(InMemory::new());
    let store = Arc::new(ObjectBlobStore::new(backend.clone(), "labels").unwrap());
    let state = Arc::new(AppState::new(&Config::default(), store));
    state.install(Arc::new(ColorFaces::new())).await.unwrap();
    let router = build_router(state.clone(), 10 * 1024 * 1024);
    let image = strip_png(&[RED]);

    let (status, body) = send(
        &router,
        post_form("/loadimages", &[("name", Part::Text("alice")), ("image", Part::File(&image))]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 2);

    let (_, body) = send(&router, post_form("/api/verify-face", &[("image", Part::File(&image))])).await;
    assert_eq!(matches(&body), vec!["alice (distance: 0.00)"]);

    let (_, body) = send(&router, get("/api/status")).await;
    let described = body["store"].as_str().unwrap();
    assert!(described.starts_with("object:") && described.ends_with("/labels"), "{described}");

    // A fresh daemon over the same bucket rebuilds the same index.
    let store = Arc::new(ObjectBlobStore::new(backend, "labels").unwrap());
    let restarted = AppState::new(&Config::default(), store);
    restarted.install(Arc::new(ColorFaces::new())).await.unwrap();
    assert!(restarted.index.current().same_contents(&state.index.current()));
}

#[tokio::test]
async fn test_alias_route_enrolls_too() {
    let app = ready_app(ColorFaces::new()).await;
    let image = strip_png(&[GREEN]);

    let (status, _) = send(
        &app.router,
        post_form(
            "/api/load-labeled-descriptors",
            &[("name", Part::Text("carol")), ("image", Part::File(&image))],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = verify(&app, &image).await;
    assert_eq!(matches(&body), vec!["carol (distance: 0.00)"]);
}

#[tokio::test]
async fn test_faceless_sample_is_accepted_but_never_matched() {
    let app = ready_app(ColorFaces::new()).await;

    let (status, _) = enroll(&app, "bob", &strip_png(&[BLACK])).await;
    assert_eq!(status, StatusCode::OK);

    let (_, status_body) = send(&app.router, get("/api/status")).await;
    let labels = status_body["labels"].as_array().unwrap();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0]["label"], "bob");
    assert_eq!(labels[0]["embeddings"], 0);
    assert_eq!(labels[0]["samples"], 1);
    assert_eq!(labels[0]["skipped"], 1);

    let (_, body) = verify(&app, &strip_png(&[RED, GREEN, BLUE])).await;
    assert!(matches(&body).iter().all(|m| !m.starts_with("bob")));
}

#[tokio::test]
async fn test_two_faces_yield_two_results_in_order() {
    let app = ready_app(ColorFaces::new()).await;
    enroll(&app, "alice", &strip_png(&[RED])).await;

    let (status, body) = verify(&app, &strip_png(&[BLUE, RED])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(matches(&body), vec!["unknown", "alice (distance: 0.00)"]);
}

#[tokio::test]
async fn test_upload_rejects_bad_input_without_publishing() {
    let app = ready_app(ColorFaces::new()).await;
    let image = strip_png(&[RED]);

    let (status, body) =
        send(&app.router, post_form("/loadimages", &[("image", Part::File(&image))])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing multipart field `name`");

    let (status, body) =
        send(&app.router, post_form("/loadimages", &[("name", Part::Text("alice"))])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing multipart field `image`");

    let (status, _) = enroll(&app, "..", &image).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = enroll(&app, "   ", &image).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = enroll(&app, "alice", b"this is not an image").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    assert_eq!(app.state.index.current().version, 1);
    assert!(!app.dir.path().join("alice").exists());
}

#[tokio::test]
async fn test_verify_rejects_missing_or_undecodable_image() {
    let app = ready_app(ColorFaces::new()).await;

    let (status, body) =
        send(&app.router, post_form("/api/verify-face", &[("name", Part::Text("x"))])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing multipart field `image`");

    let (status, _) = verify(&app, b"garbage").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_detector_failure_is_500() {
    let app = ready_app(ColorFaces::new().fail_on(GREEN)).await;

    let (status, body) = verify(&app, &strip_png(&[GREEN])).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_reload_bumps_version() {
    let app = ready_app(ColorFaces::new()).await;
    enroll(&app, "alice", &strip_png(&[RED])).await;

    let (status, body) = send(
        &app.router,
        Request::builder()
            .method(Method::POST)
            .uri("/api/reload")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 3);
    assert_eq!(app.state.index.current().get("alice").unwrap().embeddings.len(), 1);
}

#[tokio::test]
async fn test_status_reports_service_details() {
    let app = ready_app(ColorFaces::new()).await;
    enroll(&app, "alice", &strip_png(&[RED])).await;

    let (status, body) = send(&app.router, get("/api/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "index_ready");
    assert_eq!(body["ingest_state"], "idle");
    assert_eq!(body["index_version"], 2);
    assert_eq!(body["dimension"], 3);
    assert_eq!(body["threshold"], 1.0);
    assert!(body["store"].as_str().unwrap().starts_with("fs:"));
    assert_eq!(body["labels"][0]["label"], "alice");
    assert_eq!(body["labels"][0]["embeddings"], 1);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let app = new_app(256);
    app.state.install(Arc::new(ColorFaces::new())).await.unwrap();
    let big = vec![0u8; 4096];

    let (status, body) = enroll(&app, "alice", &big).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_unknown_route_is_404_json() {
    let app = new_app(1024);
    let (status, body) = send(&app.router, get("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_cors_preflight_allows_any_origin() {
    let app = new_app(1024);
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/verify-face")
        .header(header::ORIGIN, "http://example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}
