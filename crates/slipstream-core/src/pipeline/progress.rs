//! Side-channel progress events.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// What a progress event reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    DownloadSuccess,
    DownloadError,
    OcrSuccess,
    OcrError,
    ExtractionSuccess,
    ExtractionError,
    SinkSuccess,
    SinkError,
}

impl ProgressKind {
    pub fn is_error(self) -> bool {
        matches!(
            self,
            ProgressKind::DownloadError
                | ProgressKind::OcrError
                | ProgressKind::ExtractionError
                | ProgressKind::SinkError
        )
    }

    /// Pipeline stage the event belongs to.
    pub fn stage(self) -> &'static str {
        match self {
            ProgressKind::DownloadSuccess | ProgressKind::DownloadError => "download",
            ProgressKind::OcrSuccess | ProgressKind::OcrError => "ocr",
            ProgressKind::ExtractionSuccess | ProgressKind::ExtractionError => "extraction",
            ProgressKind::SinkSuccess | ProgressKind::SinkError => "sink",
        }
    }
}

impl fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = if self.is_error() { "error" } else { "success" };
        write!(f, "{}_{}", self.stage(), outcome)
    }
}

/// A `(kind, message)` notification. Best effort, never part of the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub kind: ProgressKind,
    pub message: String,
}

/// Fire-and-forget emitter of [`ProgressEvent`]s.
///
/// Every event is logged through `tracing`; when a channel is attached the
/// event is also sent to it. A dropped receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A reporter that only logs.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A reporter together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, kind: ProgressKind, message: impl Into<String>) {
        let message = message.into();
        if kind.is_error() {
            warn!(event = %kind, "{}", message);
        } else {
            debug!(event = %kind, "{}", message);
        }

        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressEvent { kind, message });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(ProgressKind::OcrSuccess.to_string(), "ocr_success");
        assert_eq!(ProgressKind::SinkError.to_string(), "sink_error");
        assert!(ProgressKind::DownloadError.is_error());
        assert!(!ProgressKind::ExtractionSuccess.is_error());
    }

    #[test]
    fn test_events_reach_channel_in_order() {
        let (reporter, mut rx) = ProgressReporter::channel();
        reporter.emit(ProgressKind::DownloadSuccess, "Downloaded a.jpg");
        reporter.clone().emit(ProgressKind::OcrError, "OCR failed");

        assert_eq!(rx.try_recv().unwrap().message, "Downloaded a.jpg");
        assert_eq!(rx.try_recv().unwrap().kind, ProgressKind::OcrError);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (reporter, rx) = ProgressReporter::channel();
        drop(rx);
        reporter.emit(ProgressKind::SinkSuccess, "still fine");
        ProgressReporter::disabled().emit(ProgressKind::SinkError, "no channel");
    }
}
