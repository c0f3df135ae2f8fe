//! Google Drive v3 client.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{api_error_message, DriveError};
use crate::handle::LazyHandle;
use crate::models::config::DriveConfig;

use super::{folder_query, RemoteFile, RemoteStore};

const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType)";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
    next_page_token: Option<String>,
}

/// Drive client authenticated with an OAuth access token.
///
/// The HTTP client is created on first use and shared by every download.
pub struct DriveClient {
    access_token: String,
    config: DriveConfig,
    http: LazyHandle<reqwest::Client>,
}

impl DriveClient {
    pub fn new(access_token: impl Into<String>, config: DriveConfig) -> Self {
        Self {
            access_token: access_token.into(),
            config,
            http: LazyHandle::new(),
        }
    }

    /// Number of parallel download workers configured for this client.
    pub fn workers(&self) -> usize {
        self.config.workers
    }

    fn http(&self) -> Result<Arc<reqwest::Client>, DriveError> {
        self.http.get_or_try_init(|| {
            debug!("Creating Drive HTTP client");
            reqwest::Client::builder()
                .user_agent(concat!("slipstream/", env!("CARGO_PKG_VERSION")))
                .timeout(Duration::from_secs(self.config.timeout_secs))
                .build()
                .map_err(|e| DriveError::Transport(e.to_string()))
        })
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DriveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DriveError::Http {
        status: status.as_u16(),
        message: api_error_message(&body),
    })
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn list_files(
        &self,
        folder_id: &str,
        mime_types: &[String],
    ) -> Result<Vec<RemoteFile>, DriveError> {
        let http = self.http()?;
        let query = folder_query(folder_id, mime_types);
        let page_size = self.config.page_size.to_string();
        let url = format!("{}/files", self.config.api_base);

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = http
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&[
                    ("q", query.as_str()),
                    ("fields", LIST_FIELDS),
                    ("pageSize", page_size.as_str()),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| DriveError::Transport(e.to_string()))?;
            let page: FileList = check_status(response)
                .await?
                .json()
                .await
                .map_err(|e| DriveError::Decode(e.to_string()))?;

            files.extend(page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        info!(folder = folder_id, count = files.len(), "Listed remote files");
        Ok(files)
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<u64, DriveError> {
        let http = self.http()?;
        let url = format!("{}/files/{}", self.config.api_base, file_id);

        let response = http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| DriveError::Transport(e.to_string()))?;
        let response = check_status(response).await?;

        // Stream into a sibling temp file, then rename into place
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = dest.with_file_name(format!("{}.part", file_name));

        let result = async {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            let mut stream = response.bytes_stream();
            let mut written: u64 = 0;

            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| DriveError::Transport(e.to_string()))?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }

            file.flush().await?;
            drop(file);
            tokio::fs::rename(&temp_path, dest).await?;
            Ok::<_, DriveError>(written)
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&temp_path).await;
        }

        let written = result?;
        debug!(file_id, bytes = written, path = %dest.display(), "Downloaded file");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> DriveConfig {
        DriveConfig {
            api_base: "http://127.0.0.1:9/drive/v3".to_string(),
            timeout_secs: 5,
            ..DriveConfig::default()
        }
    }

    #[test]
    fn test_file_list_page() {
        let body = r#"{
            "nextPageToken": "page-2",
            "files": [
                {"id": "f1", "name": "a.jpg", "mimeType": "image/jpeg"},
                {"id": "f2", "name": "b.pdf"}
            ]
        }"#;
        let page: FileList = serde_json::from_str(body).unwrap();

        assert_eq!(page.next_page_token.as_deref(), Some("page-2"));
        assert_eq!(page.files.len(), 2);
        assert_eq!(page.files[0].mime_type.as_deref(), Some("image/jpeg"));
        assert!(page.files[1].mime_type.is_none());
    }

    #[test]
    fn test_empty_folder_page() {
        let page: FileList = serde_json::from_str("{}").unwrap();
        assert!(page.files.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_listing_is_transport_error() {
        let client = DriveClient::new("token", unreachable_config());
        let err = client
            .list_files("folder", &["image/jpeg".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::Transport(_)));
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.jpg");
        let client = DriveClient::new("token", unreachable_config());

        assert!(client.download("f1", &dest).await.is_err());
        assert!(!dest.exists());
        assert!(!dir.path().join("a.jpg.part").exists());
    }
}
