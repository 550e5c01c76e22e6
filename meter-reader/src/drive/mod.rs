//! Google Drive access for pulling meter photos into the local image directory.
//!
//! Authentication uses a service-account key file exchanged for short-lived
//! read-only access tokens (see [`TokenSource`]). Listing is non-recursive
//! and skips folders and trashed files.

mod auth;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::DriveConfig;
use crate::error::{MeterError, Result};
use crate::images::resolve_image;

pub use auth::{ServiceAccountKey, TokenSource, DEFAULT_TOKEN_URL, DRIVE_READONLY_SCOPE};

pub const DEFAULT_DRIVE_BASE_URL: &str = "https://www.googleapis.com/drive/v3";
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

const PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
}

/// Remote folder of meter photos.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Files directly inside `folder_id`.
    async fn list_files(&self, folder_id: &str) -> Result<Vec<DriveFile>>;

    /// Save a file as `dest_dir/file_name`, creating the directory and
    /// replacing any existing file. Returns the local path.
    async fn download(&self, file_id: &str, file_name: &str, dest_dir: &Path) -> Result<PathBuf>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Query selecting the non-folder, non-trashed children of a folder.
pub fn folder_query(folder_id: &str) -> String {
    let escaped = folder_id.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}' in parents and mimeType != '{FOLDER_MIME_TYPE}' and trashed = false")
}

#[derive(Clone, Debug)]
pub struct DriveClient {
    http: Client,
    base_url: String,
    tokens: Arc<TokenSource>,
}

impl DriveClient {
    pub fn new(tokens: TokenSource, base_url: Option<&str>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| MeterError::Drive(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or(DEFAULT_DRIVE_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            tokens: Arc::new(tokens),
        })
    }

    /// Load the service-account key named in `config` and build a client.
    pub async fn from_config(config: &DriveConfig) -> Result<Self> {
        let key = ServiceAccountKey::from_file(&config.service_account_file).await?;
        let tokens = TokenSource::new(key, config.token_url.as_deref())?;
        info!(client_email = tokens.client_email(), "Drive client initialized");
        Self::new(tokens, config.base_url.as_deref())
    }

    async fn get(&self, url: &str) -> Result<reqwest::RequestBuilder> {
        let token = self.tokens.access_token().await?;
        Ok(self.http.get(url).bearer_auth(token))
    }
}

async fn check_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(MeterError::Drive(format!("{what} failed: {status} - {body}")))
}

/// Write `stream` to a hidden sibling of `path` and move it into place once
/// complete, so a failed transfer never clobbers an existing file.
async fn save_stream<S, B, E>(path: &Path, stream: S) -> Result<()>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    MeterError: From<E>,
{
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = path.with_file_name(format!(".{file_name}.part"));

    let written = async {
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut stream = std::pin::pin!(stream);
        while let Some(chunk) = stream.next().await {
            file.write_all(chunk?.as_ref()).await?;
        }
        file.flush().await?;
        Ok::<_, MeterError>(())
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }

    tokio::fs::rename(&partial, path).await?;
    Ok(())
}

#[async_trait]
impl FileStore for DriveClient {
    async fn list_files(&self, folder_id: &str) -> Result<Vec<DriveFile>> {
        let url = format!("{}/files", self.base_url);
        let query = folder_query(folder_id);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.get(&url).await?.query(&[
                ("q", query.as_str()),
                ("fields", "nextPageToken, files(id, name)"),
            ]);
            request = request.query(&[("pageSize", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let resp = check_status(request.send().await?, "Drive file listing").await?;
            let page: FileList = resp.json().await?;
            debug!(folder_id, count = page.files.len(), "Listed Drive page");
            files.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(files)
    }

    async fn download(&self, file_id: &str, file_name: &str, dest_dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dest_dir).await?;
        let path = resolve_image(dest_dir, file_name)?;

        let url = format!("{}/files/{}", self.base_url, file_id);
        let request = self.get(&url).await?.query(&[("alt", "media")]);
        let resp = check_status(request.send().await?, "Drive download").await?;

        save_stream(&path, resp.bytes_stream()).await?;

        debug!(file_id, path = %path.display(), "Downloaded Drive file");
        Ok(path)
    }
}
