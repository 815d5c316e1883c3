// Drive client against an in-process fake of the OAuth token endpoint and the Drive resumable
// upload API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Form, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{post, put};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use mux_drive::upload::DriveClient;
use mux_drive_core::contract::Uploader;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};

#[derive(Default)]
struct FakeDrive {
    base: Mutex<String>,
    token_calls: AtomicUsize,
    metadata: Mutex<Option<Value>>,
    upload: Mutex<Option<(usize, Option<String>)>>,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn authorised(headers: &HeaderMap) -> bool {
    matches!(bearer(headers).as_deref(), Some("fresh-token") | Some("stored-token"))
}

async fn token(
    State(drive): State<Arc<FakeDrive>>,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    drive.token_calls.fetch_add(1, Ordering::SeqCst);
    let ok = params.get("grant_type").map(String::as_str) == Some("refresh_token")
        && params.get("refresh_token").map(String::as_str) == Some("good-refresh")
        && params.get("client_id").map(String::as_str) == Some("client");
    if ok {
        Json(json!({"access_token": "fresh-token", "expires_in": 3599, "token_type": "Bearer"}))
            .into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"}))).into_response()
    }
}

async fn open_session(
    State(drive): State<Arc<FakeDrive>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(metadata): Json<Value>,
) -> Response {
    if !authorised(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if query.get("uploadType").map(String::as_str) != Some("resumable") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    if metadata["parents"][0] == "forbidden-folder" {
        return (StatusCode::FORBIDDEN, "insufficient permissions").into_response();
    }
    *drive.metadata.lock().unwrap() = Some(metadata);
    let location = format!("{}/session/1", drive.base.lock().unwrap());
    (StatusCode::OK, [(header::LOCATION, location)]).into_response()
}

async fn upload_body(
    State(drive): State<Arc<FakeDrive>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorised(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *drive.upload.lock().unwrap() = Some((body.len(), declared));
    let name = drive
        .metadata
        .lock()
        .unwrap()
        .as_ref()
        .and_then(|m| m["name"].as_str().map(str::to_string))
        .unwrap_or_default();
    Json(json!({"id": "drive-file-1", "name": name})).into_response()
}

async fn start_fake() -> (String, Arc<FakeDrive>) {
    let drive = Arc::new(FakeDrive::default());
    let app = Router::new()
        .route("/token", post(token))
        .route("/upload/drive/v3/files", post(open_session))
        .route("/session/1", put(upload_body))
        .with_state(drive.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    *drive.base.lock().unwrap() = base.clone();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (base, drive)
}

struct Setup {
    dir: TempDir,
    client: DriveClient,
}

fn setup(base: &str, credential: Value) -> Setup {
    let dir = tempdir().unwrap();
    let creds = dir.path().join("credentials.json");
    std::fs::write(&creds, credential.to_string()).unwrap();
    let client = DriveClient::new(&creds).with_upload_endpoint(format!("{base}/upload/drive/v3/files"));
    Setup { dir, client }
}

fn expired_credential(base: &str, refresh: Option<&str>) -> Value {
    json!({
        "client_id": "client",
        "client_secret": "secret",
        "refresh_token": refresh,
        "access_token": "old-token",
        "token_expiry": (Utc::now() - Duration::hours(2)).to_rfc3339(),
        "token_uri": format!("{base}/token"),
    })
}

#[tokio::test]
async fn expired_token_is_refreshed_and_file_is_streamed() {
    let (base, drive) = start_fake().await;
    let s = setup(&base, expired_credential(&base, Some("good-refresh")));
    let file = s.dir.path().join("merged.mkv");
    let payload: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&file, &payload).unwrap();

    s.client.authenticate().await.expect("authenticates");
    let uploaded = s
        .client
        .upload_file(&file, "merged.mkv", "folder-123")
        .await
        .expect("uploads");

    assert_eq!(uploaded.id, "drive-file-1");
    assert_eq!(uploaded.name, "merged.mkv");
    assert_eq!(drive.token_calls.load(Ordering::SeqCst), 1);

    let metadata = drive.metadata.lock().unwrap().clone().unwrap();
    assert_eq!(metadata["name"], "merged.mkv");
    assert_eq!(metadata["parents"], json!(["folder-123"]));

    let (received, declared) = drive.upload.lock().unwrap().clone().unwrap();
    assert_eq!(received, payload.len());
    assert_eq!(declared.as_deref(), Some("300000"));
    assert_eq!(std::fs::read(&file).unwrap(), payload, "local file untouched");
}

#[tokio::test]
async fn valid_stored_token_skips_refresh() {
    let (base, drive) = start_fake().await;
    let s = setup(
        &base,
        json!({
            "client_id": "client",
            "client_secret": "secret",
            "refresh_token": "good-refresh",
            "access_token": "stored-token",
            "token_expiry": (Utc::now() + Duration::hours(1)).to_rfc3339(),
            "token_uri": format!("{base}/token"),
        }),
    );
    let file = s.dir.path().join("merged.mkv");
    std::fs::write(&file, b"container").unwrap();

    s.client.authenticate().await.unwrap();
    s.client
        .upload_file(&file, "merged.mkv", "folder-123")
        .await
        .unwrap();

    assert_eq!(drive.token_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_credential_file_is_an_auth_error() {
    let client = DriveClient::new("/nonexistent/credentials.json");
    let err = client.authenticate().await.unwrap_err();
    assert!(err.0.contains("credential"), "got: {err}");
}

#[tokio::test]
async fn expired_token_without_refresh_token_is_an_auth_error() {
    let (base, drive) = start_fake().await;
    let s = setup(&base, expired_credential(&base, None));

    let err = s.client.authenticate().await.unwrap_err();

    assert!(err.0.contains("refresh"), "got: {err}");
    assert_eq!(drive.token_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_refresh_is_an_auth_error() {
    let (base, _drive) = start_fake().await;
    let s = setup(&base, expired_credential(&base, Some("revoked")));

    let err = s.client.authenticate().await.unwrap_err();

    assert!(err.0.contains("400"), "got: {err}");
}

#[tokio::test]
async fn upload_before_authenticate_is_an_upload_error() {
    let (base, drive) = start_fake().await;
    let s = setup(&base, expired_credential(&base, Some("good-refresh")));
    let file = s.dir.path().join("merged.mkv");
    std::fs::write(&file, b"container").unwrap();

    let err = s
        .client
        .upload_file(&file, "merged.mkv", "folder-123")
        .await
        .unwrap_err();

    assert!(err.0.contains("authentication"), "got: {err}");
    assert!(drive.metadata.lock().unwrap().is_none());
}

#[tokio::test]
async fn rejected_session_is_an_upload_error_and_keeps_local_file() {
    let (base, drive) = start_fake().await;
    let s = setup(&base, expired_credential(&base, Some("good-refresh")));
    let file = s.dir.path().join("merged.mkv");
    std::fs::write(&file, b"container").unwrap();

    s.client.authenticate().await.unwrap();
    let err = s
        .client
        .upload_file(&file, "merged.mkv", "forbidden-folder")
        .await
        .unwrap_err();

    assert!(err.0.contains("403"), "got: {err}");
    assert!(drive.upload.lock().unwrap().is_none());
    assert_eq!(std::fs::read(&file).unwrap(), b"container");
}
