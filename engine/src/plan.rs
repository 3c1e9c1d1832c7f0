//! Sync planning: what to do with each enumerated entry.
//!
//! Push decision table for a file entry (remote destination):
//!
//! | remote dest       | local source stat | decision            |
//! |-------------------|-------------------|---------------------|
//! | missing           | -                 | Transfer            |
//! | file, same size   | ok                | Skip                |
//! | file, other size  | ok                | ReplaceAndTransfer  |
//! | file              | error             | fatal               |
//! | directory         | -                 | conflict            |
//!
//! Pull uses the same table against the local filesystem except that an
//! existing file is always replaced. Hidden files are filtered before any of
//! this runs, so an excluded file never causes a remote call.

use std::io;
use std::path::Path;

use tracing::debug;

use crate::error::EngineError;
use crate::model::{Entry, MirrorOptions, SyncDecision};
use crate::port::{LocalFs, RemoteFs, TreeSource};

/// Permission bits for directories created on the remote side.
pub const REMOTE_DIR_MODE: u32 = 0o755;
/// Permission bits for directories created on the local side.
pub const LOCAL_DIR_MODE: u32 = 0o751;

/// Why an entry could not be planned.
#[derive(Debug)]
pub enum PlanFailure {
    /// Stops the whole operation regardless of the per-file policy
    Fatal(EngineError),
    /// Affects this entry only; the per-file policy decides
    Entry(EngineError),
}

/// State of the destination root before anything is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootState {
    /// Missing, or already the right kind of node
    Ready,
    /// A plain file sits where the directory tree should go
    FileInPlaceOfDir,
    /// A directory sits where the single file should go
    DirInPlaceOfFile,
}

/// Hidden files stay behind unless they were asked for.
pub fn is_excluded(entry: &Entry, options: &MirrorOptions) -> bool {
    !entry.is_dir && !options.include_hidden && entry.is_hidden()
}

/// Inspect the destination root for a type conflict.
///
/// A stat failure counts as "missing"; the skeleton phase surfaces any real
/// problem with the destination.
pub fn check_root<D: TreeSource + ?Sized>(dest: &D, dest_root: &Path, source_is_dir: bool) -> RootState {
    match dest.stat(dest_root) {
        Ok(stat) if source_is_dir && !stat.is_dir => RootState::FileInPlaceOfDir,
        Ok(stat) if !source_is_dir && stat.is_dir => RootState::DirInPlaceOfFile,
        _ => RootState::Ready,
    }
}

/// Decide a push entry against the remote destination.
pub fn decide_push<R, L>(entry: &Entry, remote: &R, local: &L) -> Result<SyncDecision, PlanFailure>
where
    R: RemoteFs + ?Sized,
    L: LocalFs + ?Sized,
{
    if entry.is_dir {
        return Ok(SyncDecision::CreateDir);
    }

    let remote_stat = match remote.stat(&entry.dest_path) {
        Ok(stat) => stat,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SyncDecision::Transfer),
        Err(e) => {
            return Err(PlanFailure::Entry(EngineError::io(
                "stat remote",
                &entry.dest_path,
                e,
            )))
        }
    };

    if remote_stat.is_dir {
        return Err(PlanFailure::Entry(EngineError::Conflict {
            path: entry.dest_path.clone(),
            reason: "a directory exists where a file should go",
        }));
    }

    // The size check must see the file as it is now, not as enumerated
    let local_stat = local
        .stat(&entry.source_path)
        .map_err(|e| PlanFailure::Fatal(EngineError::io("stat local", &entry.source_path, e)))?;

    let decision = if local_stat.size == remote_stat.size {
        SyncDecision::Skip
    } else {
        SyncDecision::ReplaceAndTransfer
    };
    debug!(
        path = %entry.dest_path.display(),
        local_size = local_stat.size,
        remote_size = remote_stat.size,
        ?decision,
        "planned push entry"
    );
    Ok(decision)
}

/// Decide a pull entry against the local destination.
///
/// No size comparison: every file is fetched again.
pub fn decide_pull<L: LocalFs + ?Sized>(entry: &Entry, local: &L) -> Result<SyncDecision, PlanFailure> {
    if entry.is_dir {
        return Ok(SyncDecision::CreateDir);
    }

    match local.stat(&entry.dest_path) {
        Ok(stat) if stat.is_dir => Err(PlanFailure::Entry(EngineError::Conflict {
            path: entry.dest_path.clone(),
            reason: "a directory exists where a file should go",
        })),
        Ok(_) => Ok(SyncDecision::ReplaceAndTransfer),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(SyncDecision::Transfer),
        Err(e) => Err(PlanFailure::Entry(EngineError::io("stat local", &entry.dest_path, e))),
    }
}
