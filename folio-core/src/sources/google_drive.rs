//! Google Drive connector
//!
//! Talks to the Drive v3 REST API with a service-account access token.
//! Folder targets are walked recursively; every leaf file becomes one Upload
//! task whose display name is the folder path accumulated from the root.

use super::{is_tracked, SourceProvider};
use crate::converter::{base_name, is_url, DocumentSource};
use crate::error::{FolioError, Result};
use crate::index::SearchIndex;
use crate::models::{IngestionTask, Provider};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const LIST_PAGE_SIZE: u32 = 1000;

/// Refresh tokens this long before they expire
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// File or folder as returned by the Drive API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// The three Drive operations ingestion needs
#[async_trait]
pub trait DriveApi: Send + Sync {
    async fn file_metadata(&self, file_id: &str) -> Result<DriveFile>;

    /// Non-trashed children of a folder, all pages
    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveFile>>;

    async fn download(&self, file_id: &str) -> Result<Vec<u8>>;
}

// === Service-account auth ===

/// Fields of a service-account JSON key used for the JWT bearer grant
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Access tokens for a service account, cached until shortly before expiry
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    http: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, http: Client) -> Self {
        Self {
            key,
            http,
            cached: Mutex::new(None),
        }
    }

    pub fn from_file(path: &Path, http: Client) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FolioError::Config(format!("Cannot read service account key {}: {}", path.display(), e))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|e| {
            FolioError::Config(format!("Invalid service account key {}: {}", path.display(), e))
        })?;
        info!("Loaded service account {}", key.client_email);
        Ok(Self::new(key, http))
    }

    fn cached_token(&self) -> Option<String> {
        let threshold = Utc::now() + Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS);
        self.cached
            .lock()
            .as_ref()
            .filter(|token| token.expires_at > threshold)
            .map(|token| token.value.clone())
    }

    fn signed_assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: DRIVE_SCOPE,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| FolioError::Auth(format!("Invalid service account private key: {}", e)))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| FolioError::Auth(format!("Failed to sign token request: {}", e)))
    }

    pub async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let now = Utc::now();
        let assertion = self.signed_assertion(now)?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FolioError::Auth(format!("Token request failed ({}): {}", status, body)));
        }
        let token: TokenResponse = response.json().await?;
        debug!("Obtained access token valid for {}s", token.expires_in);

        *self.cached.lock() = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: now + Duration::seconds(token.expires_in),
        });
        Ok(token.access_token)
    }
}

// === REST client ===

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

/// Drive v3 over plain HTTPS
pub struct GoogleDriveClient {
    http: Client,
    auth: ServiceAccountAuth,
    files_url: String,
}

impl GoogleDriveClient {
    pub fn new(http: Client, auth: ServiceAccountAuth) -> Self {
        Self {
            http,
            auth,
            files_url: DRIVE_FILES_URL.to_string(),
        }
    }

    /// Point the client at another `files` endpoint, e.g. a local mock
    pub fn with_files_url(mut self, files_url: impl Into<String>) -> Self {
        self.files_url = files_url.into();
        self
    }

    fn file_url(&self, file_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.files_url)
            .map_err(|e| FolioError::Config(format!("Invalid Drive URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| FolioError::Config("Drive URL cannot be a base".into()))?
            .push(file_id);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let token = self.auth.access_token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => FolioError::NotFound(format!("Drive {}", what)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                FolioError::Auth(format!("Drive refused {} ({}): {}", what, status, body))
            }
            _ => FolioError::Source(format!("Drive {} failed ({}): {}", what, status, body)),
        })
    }
}

/// Drive query for the live children of a folder
fn children_query(folder_id: &str) -> String {
    format!("'{}' in parents and trashed=false", folder_id.replace('\'', "\\'"))
}

#[async_trait]
impl DriveApi for GoogleDriveClient {
    async fn file_metadata(&self, file_id: &str) -> Result<DriveFile> {
        let request = self
            .http
            .get(self.file_url(file_id)?)
            .query(&[("fields", "id, name, mimeType"), ("supportsAllDrives", "true")]);
        let file: DriveFile = self
            .send(request, &format!("file {}", file_id))
            .await?
            .json()
            .await?;
        debug!("Drive file {}: {} ({})", file.id, file.name, file.mime_type);
        Ok(file)
    }

    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveFile>> {
        let query = children_query(folder_id);
        let page_size = LIST_PAGE_SIZE.to_string();
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.as_str()),
                ("pageSize", page_size.as_str()),
                ("fields", "nextPageToken, files(id, name, mimeType)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let request = self.http.get(&self.files_url).query(&params);
            let page: FileList = self
                .send(request, &format!("folder {}", folder_id))
                .await?
                .json()
                .await?;
            files.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Folder {} has {} children", folder_id, files.len());
        Ok(files)
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let request = self
            .http
            .get(self.file_url(file_id)?)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")]);
        let bytes = self
            .send(request, &format!("download {}", file_id))
            .await?
            .bytes()
            .await?;
        info!("Downloaded {} bytes of {}", bytes.len(), file_id);
        Ok(bytes.to_vec())
    }
}

// === Provider ===

/// Drive id from a share link, or the input itself when it is already an id
pub fn drive_id(source: &str) -> String {
    if is_url(source) {
        base_name(source)
    } else {
        source.trim().to_string()
    }
}

/// Google Drive as a task source
pub struct GoogleDriveSource {
    drive: Arc<dyn DriveApi>,
}

impl GoogleDriveSource {
    pub fn new(drive: Arc<dyn DriveApi>) -> Self {
        Self { drive }
    }

    /// Depth-first walk; folders recurse with the extended prefix, files
    /// become Upload tasks unless tracked or already seen in this walk
    fn walk<'a>(
        &'a self,
        folder_id: &'a str,
        prefix: String,
        parent: &'a IngestionTask,
        index: &'a dyn SearchIndex,
        seen: &'a mut HashSet<String>,
        tasks: &'a mut Vec<IngestionTask>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            for child in self.drive.list_children(folder_id).await? {
                if !seen.insert(child.id.clone()) {
                    continue;
                }
                let display_name = format!("{}/{}", prefix, child.name);

                if child.is_folder() {
                    self.walk(&child.id, display_name, parent, index, seen, tasks)
                        .await?;
                } else if is_tracked(index, &child.id).await? {
                    debug!("Skipping tracked file {} ({})", display_name, child.id);
                } else {
                    tasks.push(IngestionTask::upload_from(parent, child.id, display_name));
                }
            }
            Ok(())
        }
        .boxed()
    }
}

#[async_trait]
impl SourceProvider for GoogleDriveSource {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn discover(
        &self,
        task: &IngestionTask,
        index: &dyn SearchIndex,
    ) -> Result<Vec<IngestionTask>> {
        let root = self.drive.file_metadata(&task.source_path).await?;
        let mut tasks = Vec::new();

        if root.is_folder() {
            let mut seen = HashSet::from([root.id.clone()]);
            self.walk(&root.id, String::new(), task, index, &mut seen, &mut tasks)
                .await?;
        } else if !is_tracked(index, &root.id).await? {
            let display_name = format!("/{}", root.name);
            tasks.push(IngestionTask::upload_from(task, root.id, display_name));
        }

        info!("Found {} new files under {}", tasks.len(), task.source_path);
        Ok(tasks)
    }

    async fn open(&self, task: &IngestionTask) -> Result<DocumentSource> {
        let file_name = if task.file_name.is_empty() {
            self.drive.file_metadata(&task.source_path).await?.name
        } else {
            task.file_name.clone()
        };
        let bytes = self.drive.download(&task.source_path).await?;
        Ok(DocumentSource::with_content(file_name, bytes))
    }
}
