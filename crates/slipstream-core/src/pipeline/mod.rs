//! Streaming pipeline: per-item processing, orchestration and progress.

mod orchestrator;
mod progress;
mod stage;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::{Pipeline, PipelineBuilder};
pub use progress::{ProgressEvent, ProgressKind, ProgressReporter};
pub use stage::process_download;
