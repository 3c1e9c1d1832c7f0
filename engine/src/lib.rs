//! # TreeMirror Engine - Directory Tree Mirroring Library
//!
//! A headless engine that mirrors directory trees between the local
//! filesystem and a remote filesystem namespace, in either direction.
//! Designed as the foundation for the `treemirror` command line and for
//! automation that wants the per-file manifest.
//!
//! ## Overview
//!
//! The engine provides:
//! - Pre-order enumeration with source-to-destination path translation
//! - Directory skeleton creation before any file moves
//! - Size-based skipping on push, unconditional refresh on pull
//! - Hidden-file exclusion unless asked for
//! - Coarse progress events, optionally posted to an HTTP endpoint
//! - A per-file manifest with a configurable failure policy
//!
//! ## Basic Usage
//!
//! ```no_run
//! use mirror_engine::{connect, push, MirrorOptions, OsLocalFs, TreeRoot};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let remote = connect("file:///mnt/remote")?;
//! let roots = TreeRoot::new("/home/me/photos", "/backup/photos")?;
//!
//! let manifest = push(
//!     remote.as_ref(),
//!     &OsLocalFs::new(),
//!     &roots,
//!     &MirrorOptions::default(),
//!     None,
//! )?;
//! println!(
//!     "{} transferred, {} skipped",
//!     manifest.transferred(),
//!     manifest.skipped()
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Entries, decisions, options and the manifest
//! - **error**: Error types and handling
//! - **paths**: Source/destination root pairs and path translation
//! - **port**: Filesystem traits the engine is written against
//! - **local**: Local filesystem adapter
//! - **remote**: Remote filesystem adapters and endpoint parsing
//! - **enumerate**: Tree walking
//! - **plan**: Per-entry sync decisions
//! - **transfer**: Single-file byte movement
//! - **progress**: Progress tracking, callbacks and HTTP reporting
//! - **checksums**: Post-transfer verification
//! - **job**: Push, pull and the single-path remote commands

pub mod model;
pub mod error;
pub mod paths;
pub mod port;
pub mod local;
pub mod remote;
pub mod enumerate;
pub mod plan;
pub mod transfer;
pub mod progress;
pub mod checksums;
pub mod job;

// Re-export main types and functions
pub use model::{
    Direction, Entry, FileErrorPolicy, FileOutcome, FileState, Manifest, MirrorOptions, SyncDecision,
};
pub use error::EngineError;
pub use paths::TreeRoot;
pub use port::{FileStat, LocalFile, LocalFs, RemoteFs, TreeSource};
pub use local::OsLocalFs;
pub use remote::{connect, Endpoint, MemoryRemote, MountedRemote};
pub use progress::{ProgressCallback, ProgressEvent};
pub use checksums::{ChecksumAlgorithm, ChecksumValue};
pub use job::{list, mkdir, pull, push, remove};
