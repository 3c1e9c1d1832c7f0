//! Progress reporting.
//!
//! Progress is counted in units: one unit for the whole directory skeleton
//! plus one per file. Every `stride` completed units a [`ProgressEvent`] is
//! produced. Events go to an optional [`ProgressCallback`] and, when an
//! endpoint is configured, to [`HttpProgressReporter`] as a best-effort
//! form POST.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::model::{FileOutcome, Manifest};

/// Coarse percent-complete notification for one destination root.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub dest_root: PathBuf,
    /// 0.0 ..= 100.0
    pub percent: f64,
}

impl ProgressEvent {
    /// Percentage with two decimals, as sent on the wire.
    pub fn formatted_percent(&self) -> String {
        format!("{:.2}", self.percent)
    }
}

/// Trait for receiving updates from a running push or pull.
///
/// All methods are called synchronously on the engine's thread.
pub trait ProgressCallback: Send {
    /// Called once the source has been enumerated, before any write.
    fn on_started(&self, _manifest: &Manifest, _total_units: usize) {}

    /// Called after each file entry reaches a terminal state.
    fn on_file_completed(&self, _outcome: &FileOutcome) {}

    /// Called for every progress event at the configured cadence (push only).
    fn on_progress(&self, event: &ProgressEvent);

    /// Called when the operation finished without a fatal error.
    fn on_finished(&self, _manifest: &Manifest) {}
}

/// Counts completed units and decides when an event is due.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    dest_root: PathBuf,
    total: usize,
    completed: usize,
    stride: usize,
}

impl ProgressTracker {
    /// `file_count` files plus one unit for the directory skeleton.
    pub fn new(dest_root: &Path, file_count: usize, stride: usize) -> Self {
        ProgressTracker {
            dest_root: dest_root.to_path_buf(),
            total: file_count + 1,
            completed: 0,
            stride: stride.max(1),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    /// The skeleton unit never produces an event by itself.
    pub fn skeleton_done(&mut self) {
        self.completed += 1;
    }

    /// Count one finished file; returns an event on every `stride`-th unit.
    pub fn file_done(&mut self) -> Option<ProgressEvent> {
        self.completed += 1;
        if self.completed % self.stride != 0 {
            return None;
        }
        Some(ProgressEvent {
            dest_root: self.dest_root.clone(),
            percent: self.completed as f64 * 100.0 / self.total as f64,
        })
    }
}

/// Sends progress events as `path=<root>&progress=<NN.NN>` form POSTs.
///
/// Delivery failures are logged at debug level and otherwise ignored.
pub struct HttpProgressReporter {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl HttpProgressReporter {
    /// Returns None (after logging) if the HTTP client can't be built.
    pub fn new(endpoint: &str, timeout: Duration) -> Option<Self> {
        match reqwest::blocking::Client::builder().timeout(timeout).build() {
            Ok(client) => Some(HttpProgressReporter {
                endpoint: endpoint.to_string(),
                client,
            }),
            Err(e) => {
                warn!(endpoint, error = %e, "progress reporting disabled");
                None
            }
        }
    }

    pub fn send(&self, event: &ProgressEvent) {
        let path = event.dest_root.to_string_lossy();
        let progress = event.formatted_percent();
        let form = [("path", &*path), ("progress", progress.as_str())];
        match self.client.post(&self.endpoint).form(&form).send() {
            Ok(resp) => debug!(status = %resp.status(), progress = %progress, "progress delivered"),
            Err(e) => debug!(error = %e, progress = %progress, "progress delivery failed"),
        }
    }
}
