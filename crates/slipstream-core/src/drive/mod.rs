//! Remote file store: listing, downloads and the parallel download fan-out.

mod client;
mod fanout;

pub use client::DriveClient;
pub use fanout::{download_all, DownloadStream};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DriveError;

/// A file in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Opaque remote identifier.
    pub id: String,

    /// File name as stored remotely.
    pub name: String,

    /// MIME type reported by the store.
    #[serde(default, rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl RemoteFile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: None,
        }
    }
}

/// Listing and retrieval contract of a remote file store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List the files in a folder whose MIME type is one of `mime_types`
    /// (all files when empty). Failure here is fatal for the batch.
    async fn list_files(
        &self,
        folder_id: &str,
        mime_types: &[String],
    ) -> Result<Vec<RemoteFile>, DriveError>;

    /// Download one file to `dest`, returning the number of bytes written.
    async fn download(&self, file_id: &str, dest: &Path) -> Result<u64, DriveError>;
}

/// Browser link to a Drive file, used as the provenance link in sinks.
pub fn file_url(file_id: &str) -> String {
    format!("https://drive.google.com/file/d/{}/view", file_id)
}

/// Build the Drive search query for a folder and MIME filter.
pub fn folder_query(folder_id: &str, mime_types: &[String]) -> String {
    let mut query = format!("'{}' in parents", folder_id.replace('\'', "\\'"));
    if !mime_types.is_empty() {
        let mimes = mime_types
            .iter()
            .map(|m| format!("mimeType='{}'", m))
            .collect::<Vec<_>>()
            .join(" or ");
        query.push_str(&format!(" and ({})", mimes));
    }
    query.push_str(" and trashed = false");
    query
}

/// Resolve the local path a remote file is written to.
///
/// Names that could escape `dest_dir` are rejected.
pub fn resolve_destination(dest_dir: &Path, name: &str) -> Result<PathBuf, DriveError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\', '\0'])
    {
        return Err(DriveError::InvalidName(name.to_string()));
    }
    Ok(dest_dir.join(trimmed))
}

/// Resolve destinations for a whole batch. Repeated names are prefixed with
/// the remote id so that every file owns a distinct path.
pub(crate) fn plan_destinations(
    dest_dir: &Path,
    files: &[RemoteFile],
) -> Vec<Result<PathBuf, DriveError>> {
    let mut seen = HashSet::new();
    files
        .iter()
        .map(|file| {
            let path = resolve_destination(dest_dir, &file.name)?;
            if seen.insert(path.clone()) {
                return Ok(path);
            }

            let name = file.name.trim();
            let mut renamed = resolve_destination(dest_dir, &format!("{}_{}", file.id, name))?;
            let mut n = 1;
            while !seen.insert(renamed.clone()) {
                renamed = resolve_destination(dest_dir, &format!("{}_{}_{}", file.id, n, name))?;
                n += 1;
            }
            Ok(renamed)
        })
        .collect()
}
