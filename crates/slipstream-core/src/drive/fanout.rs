//! Bounded parallel downloads exposed as a stream of outcomes.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures_util::{FutureExt, Stream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{panic_message, DriveError};
use crate::models::outcome::DownloadOutcome;

use super::{plan_destinations, RemoteFile, RemoteStore};

struct DownloadJob {
    file: RemoteFile,
    destination: Result<PathBuf, DriveError>,
}

/// Download outcomes in completion order.
///
/// The stream ends once every submitted file has produced an outcome.
/// Dropping it stops the workers after their current download.
pub struct DownloadStream {
    rx: mpsc::Receiver<DownloadOutcome>,
}

impl DownloadStream {
    /// Receive the next outcome, or `None` when all downloads are done.
    pub async fn next_outcome(&mut self) -> Option<DownloadOutcome> {
        self.rx.recv().await
    }
}

impl Stream for DownloadStream {
    type Item = DownloadOutcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Download `files` into `dest_dir` with at most `workers` transfers in
/// flight. Must be called from within a tokio runtime.
///
/// Every file yields exactly one outcome. Failures, including a panicking
/// store, are captured in the outcome and never affect other files.
pub fn download_all(
    store: Arc<dyn RemoteStore>,
    files: Vec<RemoteFile>,
    dest_dir: impl Into<PathBuf>,
    workers: usize,
) -> DownloadStream {
    let dest_dir = dest_dir.into();
    let workers = workers.max(1);
    let (tx, rx) = mpsc::channel(workers);

    let destinations = plan_destinations(&dest_dir, &files);
    let queue: VecDeque<DownloadJob> = files
        .into_iter()
        .zip(destinations)
        .map(|(file, destination)| DownloadJob { file, destination })
        .collect();

    debug!(count = queue.len(), workers, "Starting downloads");
    let queue = Arc::new(Mutex::new(queue));

    for _ in 0..workers {
        let queue = Arc::clone(&queue);
        let store = Arc::clone(&store);
        let tx = tx.clone();
        let dest_dir = dest_dir.clone();

        tokio::spawn(async move {
            loop {
                let job = queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front();
                let Some(job) = job else { break };

                let outcome = download_one(store.as_ref(), job, &dest_dir).await;
                if tx.send(outcome).await.is_err() {
                    break;
                }
            }
        });
    }

    DownloadStream { rx }
}

async fn download_one(store: &dyn RemoteStore, job: DownloadJob, dest_dir: &Path) -> DownloadOutcome {
    let DownloadJob { file, destination } = job;

    let path = match destination {
        Ok(path) => path,
        Err(e) => {
            warn!(file_id = %file.id, error = %e, "Skipping download");
            return DownloadOutcome::failed(file.id, file.name, dest_dir, e.to_string());
        }
    };

    let result = AssertUnwindSafe(store.download(&file.id, &path))
        .catch_unwind()
        .await;

    match result {
        Ok(Ok(_)) => DownloadOutcome::succeeded(file.id, file.name, path),
        Ok(Err(e)) => {
            warn!(file_id = %file.id, error = %e, "Download failed");
            DownloadOutcome::failed(file.id, file.name, path, e.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(file_id = %file.id, error = %message, "Download failed");
            DownloadOutcome::failed(file.id, file.name, path, message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeStore {
        failing: HashMap<String, u16>,
        panicking: Option<String>,
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl RemoteStore for FakeStore {
        async fn list_files(&self, _: &str, _: &[String]) -> Result<Vec<RemoteFile>, DriveError> {
            Ok(Vec::new())
        }

        async fn download(&self, file_id: &str, dest: &Path) -> Result<u64, DriveError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.panicking.as_deref() == Some(file_id) {
                panic!("connection pool poisoned");
            }
            if let Some(status) = self.failing.get(file_id) {
                return Err(DriveError::Http { status: *status, message: "denied".into() });
            }
            let bytes = format!("bytes of {}", file_id);
            std::fs::write(dest, &bytes)?;
            Ok(bytes.len() as u64)
        }
    }

    fn files(n: usize) -> Vec<RemoteFile> {
        (1..=n)
            .map(|i| RemoteFile::new(format!("id{i}"), format!("r{i}.jpg")))
            .collect()
    }

    #[tokio::test]
    async fn test_every_file_yields_one_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::default());

        let outcomes: Vec<DownloadOutcome> =
            download_all(store, files(5), dir.path(), 3).collect().await;

        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.iter().all(|o| o.is_success()));
        for outcome in &outcomes {
            let content = std::fs::read_to_string(outcome.local_path()).unwrap();
            assert_eq!(content, format!("bytes of {}", outcome.item_id()));
        }
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore {
            failing: HashMap::from([("id2".to_string(), 403)]),
            ..Default::default()
        });

        let outcomes: Vec<DownloadOutcome> =
            download_all(store, files(3), dir.path(), 2).collect().await;

        assert_eq!(outcomes.len(), 3);
        let failed: Vec<_> = outcomes.iter().filter(|o| !o.is_success()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].item_id(), "id2");
        assert!(failed[0].error().unwrap().contains("403"));
    }

    #[tokio::test]
    async fn test_panicking_store_becomes_failed_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore {
            panicking: Some("id1".to_string()),
            ..Default::default()
        });

        let outcomes: Vec<DownloadOutcome> =
            download_all(store, files(3), dir.path(), 1).collect().await;

        assert_eq!(outcomes.len(), 3);
        let failed = outcomes.iter().find(|o| o.item_id() == "id1").unwrap();
        assert!(failed.error().unwrap().contains("connection pool poisoned"));
        assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 2);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded_by_workers() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore {
            delay: Duration::from_millis(20),
            ..Default::default()
        });

        let outcomes: Vec<DownloadOutcome> =
            download_all(store.clone(), files(8), dir.path(), 2).collect().await;

        assert_eq!(outcomes.len(), 8);
        assert!(store.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_invalid_name_fails_without_download() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::default());
        let batch = vec![RemoteFile::new("bad", "../escape.jpg"), RemoteFile::new("ok", "fine.jpg")];

        let outcomes: Vec<DownloadOutcome> =
            download_all(store.clone(), batch, dir.path(), 2).collect().await;

        let bad = outcomes.iter().find(|o| o.item_id() == "bad").unwrap();
        assert!(!bad.is_success());
        assert!(bad.error().unwrap().contains("invalid destination name"));
        assert!(outcomes.iter().find(|o| o.item_id() == "ok").unwrap().is_success());
    }

    #[tokio::test]
    async fn test_empty_batch_ends_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut stream = download_all(Arc::new(FakeStore::default()), Vec::new(), dir.path(), 4);
        assert!(stream.next_outcome().await.is_none());
    }
}
