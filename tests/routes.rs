mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::{local_pipeline, zip_bytes, ZipItem};
use experiment_storage::{routes, AppState};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

fn test_app(max_body_bytes: usize) -> (TempDir, Router) {
    let (dir, pipeline) = local_pipeline();
    let state = AppState {
        pipeline,
        max_body_bytes,
    };
    (dir, routes::app(state))
}

async fn send(app: &Router, method: Method, uri: &str, body: Vec<u8>) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    (status, bytes.to_vec())
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn health_reports_the_local_backend() {
    let (_dir, app) = test_app(1024);
    let (status, body) = send(&app, Method::GET, "/health", Vec::new()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["backend"], "local");
}

#[tokio::test]
async fn upload_then_download_a_resource() {
    let (_dir, app) = test_app(1024 * 1024);

    let (status, body) = send(
        &app,
        Method::POST,
        "/experiments/exp1/resources/resource?filename=syllabus.pdf",
        b"%PDF-1.4".to_vec(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let resp = json(&body);
    assert_eq!(resp["ok"], true);
    let key = resp["key"].as_str().unwrap().to_string();
    assert!(key.starts_with("exp1/resource/"));

    let req = Request::builder()
        .uri(format!("/objects?key={}", key))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/pdf"
    );
    let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    assert_eq!(&bytes[..], b"%PDF-1.4");

    let (status, body) = send(&app, Method::GET, &format!("/objects/url?key={}", key), Vec::new()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json(&body)["url"].as_str().unwrap(),
        format!("http://files.test/resource/{}", key)
    );
}

#[tokio::test]
async fn unknown_resource_type_is_a_bad_request() {
    let (_dir, app) = test_app(1024);
    let (status, _) = send(
        &app,
        Method::POST,
        "/experiments/exp1/resources/video?filename=a.mp4",
        b"x".to_vec(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn traversal_keys_are_rejected() {
    let (_dir, app) = test_app(1024);
    for uri in [
        "/objects?key=../default/secret",
        "/objects?key=%2Fetc%2Fpasswd",
        "/objects/stat?key=s1/e1/t1/..%2F..%2Fx",
    ] {
        let (status, body) = send(&app, Method::GET, uri, Vec::new()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(json(&body)["error"].is_string());
    }
}

#[tokio::test]
async fn missing_objects_are_not_found() {
    let (_dir, app) = test_app(1024);
    let (status, _) = send(
        &app,
        Method::GET,
        "/objects?key=s1/e1/t1/20240101-000000-none.txt",
        Vec::new(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn archive_upload_and_format_errors() {
    let (_dir, app) = test_app(1024 * 1024);
    let data = zip_bytes(&[
        ZipItem::File("a.txt", b"alpha"),
        ZipItem::File("dir/b.txt", b"bravo"),
    ]);

    let (status, body) = send(
        &app,
        Method::POST,
        "/experiments/exp1/archives?filename=lab.zip&task_id=t1",
        data,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let keys = json(&body)["keys"].as_array().unwrap().clone();
    assert_eq!(keys.len(), 3);
    assert_eq!(keys[0], "exp1/experiment/t1/a.txt");

    let (status, _) = send(
        &app,
        Method::POST,
        "/experiments/exp1/archives?filename=lab.rar",
        b"Rar!".to_vec(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn code_submission_and_cleanup() {
    let (_dir, app) = test_app(1024 * 1024);
    let body = serde_json::json!({
        "files": [
            {"filename": "Main.java", "content": "class Main {}"},
            {"filename": "", "content": "ignored"}
        ]
    });
    let req = Request::builder()
        .method(Method::POST)
        .uri("/submissions/s1/e1/t1/code")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    assert_eq!(json(&bytes)["keys"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        Method::DELETE,
        "/submissions/s1/e1/t1?dry_run=true",
        Vec::new(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["objects_examined"], 1);

    let (status, body) = send(&app, Method::DELETE, "/submissions/s1/e1/t1", Vec::new()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["objects_deleted"], 1);

    let (_, body) = send(&app, Method::DELETE, "/submissions/s1/e1/t1", Vec::new()).await;
    assert_eq!(json(&body)["objects_examined"], 0);
}

#[tokio::test]
async fn delete_object_returns_no_content() {
    let (_dir, app) = test_app(1024);
    let (_, body) = send(
        &app,
        Method::POST,
        "/uploads/generic?resource_type=notes&filename=n.txt",
        b"hello".to_vec(),
    )
    .await;
    let key = json(&body)["key"].as_str().unwrap().to_string();

    let (status, _) = send(&app, Method::DELETE, &format!("/objects?key={}", key), Vec::new()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, &format!("/objects?key={}", key), Vec::new()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_bodies_are_refused() {
    let (_dir, app) = test_app(16);
    let (status, _) = send(
        &app,
        Method::POST,
        "/submissions/s1/e1/t1?filename=big.bin",
        vec![0u8; 1024],
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}
