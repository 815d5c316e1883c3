#![doc = "Google Drive implementation of the core `Uploader` contract."]
//
//! # Drive uploader (CLI <-> Core)
//!
//! [`DriveClient`] authenticates with a stored OAuth2 authorized-user credential and pushes the
//! finished container into a Drive folder.
//!
//! ## Credential file
//!
//! A JSON document with `client_id`, `client_secret`, `refresh_token` and optionally
//! `access_token`, `token_expiry` (RFC 3339) and `token_uri`. A still-valid access token is used
//! as is; otherwise the refresh token is exchanged at `token_uri`.
//!
//! ## Upload protocol
//!
//! Drive v3 resumable upload, done in one go: a session is opened with the file metadata
//! (`name`, `parents`), then the whole file is `PUT` to the session URI, streamed from disk with
//! its exact `Content-Length`. The local file is only ever read.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mux_drive_core::contract::{UploadedFile, Uploader};
use mux_drive_core::error::{AuthError, UploadError};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_UPLOAD_ENDPOINT: &str = "https://www.googleapis.com/upload/drive/v3/files";

/// Tokens this close to expiry are refreshed rather than reused.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// On-disk authorized-user credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl StoredCredential {
    /// The stored access token, if it is still good for at least the expiry margin.
    /// A token without an expiry is treated as expired.
    pub fn valid_access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.access_token, self.token_expiry) {
            (Some(token), Some(expiry)) if expiry - Duration::seconds(EXPIRY_MARGIN_SECS) > now => {
                Some(token.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

pub struct DriveClient {
    http: reqwest::Client,
    credentials_path: PathBuf,
    upload_endpoint: String,
    access_token: Mutex<Option<String>>,
}

impl DriveClient {
    pub fn new(credentials_path: impl Into<PathBuf>) -> Self {
        let credentials_path = credentials_path.into();
        tracing::info!(credentials = %credentials_path.display(), "Initialised Drive client");
        Self {
            http: reqwest::Client::new(),
            credentials_path,
            upload_endpoint: DEFAULT_UPLOAD_ENDPOINT.to_string(),
            access_token: Mutex::new(None),
        }
    }

    /// Point uploads at a different files endpoint (e.g. a local fake).
    pub fn with_upload_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.upload_endpoint = endpoint.into();
        self
    }

    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    async fn load_credential(&self) -> Result<StoredCredential, AuthError> {
        let raw = match tokio::fs::read_to_string(&self.credentials_path).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(error = ?e, credentials = %self.credentials_path.display(), "Failed to read credential file");
                return Err(AuthError(format!(
                    "cannot read credential file {}: {e}",
                    self.credentials_path.display()
                )));
            }
        };
        serde_json::from_str(&raw).map_err(|e| {
            tracing::error!(error = ?e, credentials = %self.credentials_path.display(), "Credential file is not valid JSON");
            AuthError(format!(
                "invalid credential file {}: {e}",
                self.credentials_path.display()
            ))
        })
    }

    async fn refresh(&self, credential: &StoredCredential) -> Result<String, AuthError> {
        let refresh_token = credential.refresh_token.as_deref().ok_or_else(|| {
            tracing::error!("Access token expired and credential has no refresh token");
            AuthError("access token expired and no refresh token is stored".to_string())
        })?;
        let token_uri = credential.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        tracing::info!(token_uri, "Refreshing Drive access token");

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        let resp = self
            .http
            .post(token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, token_uri, "Token endpoint unreachable");
                AuthError(format!("token refresh request failed: {e}"))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "Token refresh rejected");
            return Err(AuthError(format!("token refresh rejected with {status}: {body}")));
        }

        let token: TokenResponse = resp.json().await.map_err(|e| {
            tracing::error!(error = ?e, "Malformed token response");
            AuthError(format!("malformed token response: {e}"))
        })?;
        tracing::info!(expires_in = ?token.expires_in, "Obtained fresh access token");
        Ok(token.access_token)
    }

    async fn open_session(
        &self,
        token: &str,
        remote_name: &str,
        folder_id: &str,
        len: u64,
    ) -> Result<String, UploadError> {
        let metadata = serde_json::json!({
            "name": remote_name,
            "parents": [folder_id],
        });
        let resp = self
            .http
            .post(&self.upload_endpoint)
            .query(&[("uploadType", "resumable"), ("fields", "id,name")])
            .bearer_auth(token)
            .header("X-Upload-Content-Length", len)
            .json(&metadata)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, endpoint = %self.upload_endpoint, "Failed to open upload session");
                UploadError(format!("opening upload session failed: {e}"))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "Upload session rejected");
            return Err(UploadError(format!("upload session rejected with {status}: {body}")));
        }

        match resp.headers().get(LOCATION).and_then(|v| v.to_str().ok()) {
            Some(location) => Ok(location.to_string()),
            None => {
                tracing::error!(%status, "Upload session response has no Location header");
                Err(UploadError(
                    "upload session response has no Location header".to_string(),
                ))
            }
        }
    }
}

#[async_trait]
impl Uploader for DriveClient {
    async fn authenticate(&self) -> Result<(), AuthError> {
        let credential = self.load_credential().await?;
        let token = match credential.valid_access_token(Utc::now()) {
            Some(token) => {
                tracing::info!("Reusing stored access token");
                token.to_string()
            }
            None => self.refresh(&credential).await?,
        };
        *self.access_token.lock().await = Some(token);
        tracing::info!("Authenticated with Google Drive");
        Ok(())
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        remote_name: &str,
        folder_id: &str,
    ) -> Result<UploadedFile, UploadError> {
        let token = self
            .access_token
            .lock()
            .await
            .clone()
            .ok_or_else(|| UploadError("upload attempted before authentication".to_string()))?;

        let file = tokio::fs::File::open(local_path).await.map_err(|e| {
            tracing::error!(error = ?e, file = %local_path.display(), "Failed to open file for upload");
            UploadError(format!("cannot open {}: {e}", local_path.display()))
        })?;
        let len = file
            .metadata()
            .await
            .map_err(|e| UploadError(format!("cannot stat {}: {e}", local_path.display())))?
            .len();

        tracing::info!(
            file = %local_path.display(),
            remote_name,
            folder_id,
            bytes = len,
            "Uploading file to Google Drive"
        );
        let session = self.open_session(&token, remote_name, folder_id, len).await?;

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let resp = self
            .http
            .put(&session)
            .bearer_auth(&token)
            .header(CONTENT_LENGTH, len)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, file = %local_path.display(), "Upload request failed");
                UploadError(format!("upload request failed: {e}"))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "Drive rejected upload");
            return Err(UploadError(format!("upload rejected with {status}: {body}")));
        }

        let created: DriveFile = resp.json().await.map_err(|e| {
            tracing::error!(error = ?e, "Malformed upload response");
            UploadError(format!("malformed upload response: {e}"))
        })?;
        tracing::info!(id = %created.id, remote_name, "File uploaded to Google Drive");
        Ok(UploadedFile {
            id: created.id,
            name: created.name.unwrap_or_else(|| remote_name.to_string()),
        })
    }
}
