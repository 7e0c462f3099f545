//! Integration tests for the document API.
//!
//! The router is driven in-process against the in-memory backend.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use vault_server::config::Config;
use vault_server::{app, AppState};

fn test_app() -> Router {
    app(AppState::memory(Config::default()))
}

fn secured_app() -> Router {
    let config = Config {
        auth_secret: Some("secret".to_string()),
        ..Config::default()
    };
    app(AppState::memory(config))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_reports_storage_backend() {
    let app = test_app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn create_then_get() {
    let app = test_app();
    let (status, created) = send(
        &app,
        Method::POST,
        "/documents",
        Some("alice"),
        Some(json!({"content": {"ciphertext": "abc"}})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["version"], 1);
    let uid = created["uid"].as_str().unwrap().to_string();

    let (status, fetched) = send(
        &app,
        Method::GET,
        &format!("/documents/{}", uid),
        Some("alice"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["content"], json!({"ciphertext": "abc"}));
}

#[tokio::test]
async fn replace_with_current_version_bumps_it() {
    let app = test_app();
    let (_, created) = send(
        &app,
        Method::POST,
        "/documents",
        Some("alice"),
        Some(json!({"content": {"v": 1}})),
    )
    .await;
    let uri = format!("/documents/{}", created["uid"].as_str().unwrap());

    let (status, replaced) = send(
        &app,
        Method::PUT,
        &uri,
        Some("alice"),
        Some(json!({"content": {"v": 2}, "expectedVersion": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced["version"], 2);
    assert_eq!(replaced["content"], json!({"v": 2}));
}

#[tokio::test]
async fn stale_replace_is_a_conflict() {
    let app = test_app();
    let (_, created) = send(
        &app,
        Method::POST,
        "/documents",
        Some("alice"),
        Some(json!({"content": {}})),
    )
    .await;
    let uri = format!("/documents/{}", created["uid"].as_str().unwrap());

    for version in 1..5 {
        let (status, _) = send(
            &app,
            Method::PUT,
            &uri,
            Some("alice"),
            Some(json!({"content": {"v": version}, "expectedVersion": version})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        Some("alice"),
        Some(json!({"content": {"v": "stale"}, "expectedVersion": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "version conflict");
    assert_eq!(body["serverVersion"], 5);

    // The stale write left nothing behind.
    let (_, fetched) = send(&app, Method::GET, &uri, Some("alice"), None).await;
    assert_eq!(fetched["content"], json!({"v": 4}));
}

#[tokio::test]
async fn unknown_document_is_not_found() {
    let app = test_app();
    let (status, _) = send(&app, Method::GET, "/documents/nope", Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/documents/nope",
        Some("alice"),
        Some(json!({"content": {}, "expectedVersion": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_is_scoped_to_owner_and_limited() {
    let app = test_app();
    for n in 0..3 {
        send(
            &app,
            Method::POST,
            "/documents",
            Some("alice"),
            Some(json!({"content": {"n": n}})),
        )
        .await;
    }

    let (status, body) = send(&app, Method::GET, "/documents?limit=1", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    let documents = body["documents"].as_array().unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0]["content"], json!({"n": 0}));

    let (_, body) = send(&app, Method::GET, "/documents", Some("alice"), None).await;
    assert_eq!(body["documents"].as_array().unwrap().len(), 3);

    let (_, body) = send(&app, Method::GET, "/documents", Some("bob"), None).await;
    assert!(body["documents"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn other_owners_cannot_read_documents() {
    let app = test_app();
    let (_, created) = send(
        &app,
        Method::POST,
        "/documents",
        Some("alice"),
        Some(json!({"content": {"secret": true}})),
    )
    .await;
    let uri = format!("/documents/{}", created["uid"].as_str().unwrap());

    let (status, _) = send(&app, Method::GET, &uri, Some("mallory"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn anonymous_access_without_secret() {
    let app = test_app();
    let (status, _) = send(
        &app,
        Method::POST,
        "/documents",
        None,
        Some(json!({"content": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn secret_requires_bearer_token() {
    let app = secured_app();
    let (status, _) = send(&app, Method::GET, "/documents", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/documents", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_authorization_is_rejected() {
    let app = test_app();
    let request = Request::builder()
        .uri("/documents")
        .header(header::AUTHORIZATION, "Basic abc")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
