//! Core data model for mirroring operations.
//!
//! - Entry: one node found while walking the source tree
//! - SyncDecision: what the planner decided for an entry
//! - FileOutcome / Manifest: per-entry results of one push or pull
//! - MirrorOptions: the explicit configuration passed into the engine

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::checksums::ChecksumAlgorithm;
use crate::error::EngineError;
use crate::paths::TreeRoot;

/// Direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Local filesystem to remote filesystem
    Push,
    /// Remote filesystem to local filesystem
    Pull,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Push => write!(f, "push"),
            Direction::Pull => write!(f, "pull"),
        }
    }
}

/// One file or directory discovered during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Absolute path in the source namespace
    pub source_path: PathBuf,
    /// Absolute path in the destination namespace
    pub dest_path: PathBuf,
    pub is_dir: bool,
    /// Size in bytes (0 for directories)
    pub size: u64,
}

impl Entry {
    /// True if the base name starts with `.`.
    pub fn is_hidden(&self) -> bool {
        self.source_path
            .file_name()
            .map(|name| name.to_string_lossy().starts_with('.'))
            .unwrap_or(false)
    }
}

/// What the planner decided for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncDecision {
    CreateDir,
    /// Destination already has a file of the same size
    Skip,
    /// Destination has a file of a different size; replace it
    ReplaceAndTransfer,
    /// Destination does not exist
    Transfer,
}

/// Terminal state of a file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    /// Bytes were transferred
    Done,
    /// Destination already matched
    Skipped,
    /// Hidden file left out because hidden files were not requested
    Excluded,
    /// Transfer or verification failed
    Failed,
}

/// Result for one file entry.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
    /// None when the file was excluded or failed before a decision was made
    pub decision: Option<SyncDecision>,
    pub state: FileState,
    pub bytes: u64,
    pub error_message: Option<String>,
    /// Some(..) only when verification was requested and ran
    pub verification_passed: Option<bool>,
}

impl FileOutcome {
    pub(crate) fn new(entry: &Entry, decision: Option<SyncDecision>, state: FileState) -> Self {
        FileOutcome {
            source_path: entry.source_path.clone(),
            dest_path: entry.dest_path.clone(),
            decision,
            state,
            bytes: 0,
            error_message: None,
            verification_passed: None,
        }
    }
}

/// What to do when a single file cannot be transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileErrorPolicy {
    /// Stop the whole operation with the error
    Abort,
    /// Record the failure in the manifest and move on
    Continue,
}

/// Configuration for one push or pull.
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    /// Transfer files whose name starts with `.`
    pub include_hidden: bool,
    /// Replace a conflicting non-directory destination root
    pub force: bool,
    /// Where to POST progress events (push only)
    pub progress_endpoint: Option<String>,
    /// Emit an event every `progress_stride` completed units
    pub progress_stride: usize,
    pub progress_timeout: Duration,
    /// None picks the direction default: push aborts, pull continues
    pub on_file_error: Option<FileErrorPolicy>,
    /// Re-read both sides after each transfer and compare checksums
    pub verify: Option<ChecksumAlgorithm>,
    /// Copy the remote modification time onto pulled files
    pub preserve_mtime: bool,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        MirrorOptions {
            include_hidden: false,
            force: false,
            progress_endpoint: None,
            progress_stride: 5,
            progress_timeout: Duration::from_secs(1),
            on_file_error: None,
            verify: None,
            preserve_mtime: true,
        }
    }
}

impl MirrorOptions {
    pub fn file_error_policy(&self, direction: Direction) -> FileErrorPolicy {
        self.on_file_error.unwrap_or(match direction {
            Direction::Push => FileErrorPolicy::Abort,
            Direction::Pull => FileErrorPolicy::Continue,
        })
    }
}

/// Everything that happened during one push or pull.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub id: Uuid,
    pub direction: Direction,
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Destination directories realised before any file was transferred
    pub directories_created: usize,
    pub files: Vec<FileOutcome>,
    /// Subtrees the walk could not read
    pub warnings: Vec<String>,
    /// Percentages posted to the progress endpoint, in order
    pub progress_events: Vec<f64>,
}

impl Manifest {
    pub fn new(direction: Direction, roots: &TreeRoot) -> Self {
        Manifest {
            id: Uuid::new_v4(),
            direction,
            source_root: roots.source().to_path_buf(),
            dest_root: roots.dest().to_path_buf(),
            started_at: Utc::now(),
            finished_at: None,
            directories_created: 0,
            files: Vec::new(),
            warnings: Vec::new(),
            progress_events: Vec::new(),
        }
    }

    fn count(&self, state: FileState) -> usize {
        self.files.iter().filter(|f| f.state == state).count()
    }

    pub fn transferred(&self) -> usize {
        self.count(FileState::Done)
    }

    pub fn skipped(&self) -> usize {
        self.count(FileState::Skipped)
    }

    pub fn excluded(&self) -> usize {
        self.count(FileState::Excluded)
    }

    pub fn failed(&self) -> usize {
        self.count(FileState::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.files
            .iter()
            .filter(|f| f.state == FileState::Done)
            .map(|f| f.bytes)
            .sum()
    }

    pub fn outcome_for(&self, dest_path: &Path) -> Option<&FileOutcome> {
        self.files.iter().find(|f| f.dest_path == dest_path)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the manifest as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<(), EngineError> {
        let file = fs::File::create(path).map_err(|e| EngineError::io("write manifest", path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| EngineError::io("write manifest", path, e.into()))
    }
}
