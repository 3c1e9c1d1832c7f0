//! Operation orchestration.
//!
//! This module provides the operations the command line exposes:
//! - `push`: mirror a local tree into the remote filesystem
//! - `pull`: mirror a remote tree onto the local filesystem
//! - `mkdir`, `remove`, `list`: single-path remote commands
//!
//! Push and pull run the same pipeline: stat the source root, check the
//! destination root for a type conflict, enumerate, realise the directory
//! skeleton, then plan and transfer each file in enumeration order.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::checksums;
use crate::enumerate::{enumerate, Enumeration};
use crate::error::EngineError;
use crate::local::resolve_existing_prefix;
use crate::model::{
    Direction, Entry, FileErrorPolicy, FileOutcome, FileState, Manifest, MirrorOptions, SyncDecision,
};
use crate::paths::TreeRoot;
use crate::plan::{self, PlanFailure, RootState, LOCAL_DIR_MODE, REMOTE_DIR_MODE};
use crate::port::{FileStat, LocalFs, RemoteFs, TreeSource};
use crate::progress::{HttpProgressReporter, ProgressCallback, ProgressEvent, ProgressTracker};
use crate::transfer;

/// Mirror a local tree into the remote filesystem.
///
/// Files already present remotely with the same size are skipped; files
/// with a different size are removed and transferred again. Progress events
/// are produced every `options.progress_stride` completed units and posted
/// to `options.progress_endpoint` when one is configured.
///
/// # Arguments
/// * `remote` - Remote filesystem session
/// * `local` - Local filesystem
/// * `roots` - Local source root and remote destination root
/// * `options` - Operation configuration
/// * `callback` - Optional listener for progress updates
///
/// # Returns
/// The manifest of every file entry and its outcome
///
/// # Errors
/// Conflicting destination roots, directory-skeleton failures and source
/// stat failures during size-mismatch resolution always abort. Other
/// per-file failures abort unless `options.on_file_error` says otherwise.
pub fn push<R, L>(
    remote: &R,
    local: &L,
    roots: &TreeRoot,
    options: &MirrorOptions,
    callback: Option<&dyn ProgressCallback>,
) -> Result<Manifest, EngineError>
where
    R: RemoteFs + ?Sized,
    L: LocalFs + ?Sized,
{
    let mut manifest = Manifest::new(Direction::Push, roots);
    info!(
        id = %manifest.id,
        source = %roots.source().display(),
        dest = %roots.dest().display(),
        "starting push"
    );

    let source = stat_source(local, roots.source())?;
    check_not_nested(Some(roots.source().to_path_buf()), remote.host_path(roots.dest()))?;
    match plan::check_root(remote, roots.dest(), source.is_dir) {
        RootState::Ready => {}
        RootState::FileInPlaceOfDir if options.force => {
            warn!(path = %roots.dest().display(), "removing remote file in place of destination directory");
            remote
                .remove_all(roots.dest())
                .map_err(|e| EngineError::io("remove remote", roots.dest(), e))?;
        }
        state => return Err(root_conflict(roots.dest(), state)),
    }

    let tree = enumerate_source(local, roots, &source);
    manifest.warnings = tree.warnings;
    let mut tracker = ProgressTracker::new(roots.dest(), tree.files.len(), options.progress_stride);
    if let Some(cb) = callback {
        cb.on_started(&manifest, tracker.total());
    }

    for dir in skeleton(&tree.directories, roots, source.is_dir) {
        remote
            .mkdir_all(dir, REMOTE_DIR_MODE)
            .map_err(|e| EngineError::io("mkdir remote", dir, e))?;
        manifest.directories_created += 1;
    }
    tracker.skeleton_done();

    let reporter = options
        .progress_endpoint
        .as_deref()
        .and_then(|endpoint| HttpProgressReporter::new(endpoint, options.progress_timeout));
    let policy = options.file_error_policy(Direction::Push);

    for entry in &tree.files {
        let outcome = push_entry(remote, local, entry, options, policy)?;
        if let Some(cb) = callback {
            cb.on_file_completed(&outcome);
        }
        manifest.files.push(outcome);

        if let Some(event) = tracker.file_done() {
            emit(&mut manifest, &event, reporter.as_ref(), callback);
        }
    }

    Ok(finish(manifest, callback))
}

/// Mirror a remote tree onto the local filesystem.
///
/// Every file is fetched again (no size-based skipping) and no progress
/// events are produced.
///
/// # Arguments
/// * `remote` - Remote filesystem session
/// * `local` - Local filesystem
/// * `roots` - Remote source root and local destination root
/// * `options` - Operation configuration
/// * `callback` - Optional listener for per-file completion
///
/// # Errors
/// Conflicting destination roots and local directory-creation failures
/// always abort. Per-file failures are recorded in the manifest unless
/// `options.on_file_error` is `Abort`.
pub fn pull<R, L>(
    remote: &R,
    local: &L,
    roots: &TreeRoot,
    options: &MirrorOptions,
    callback: Option<&dyn ProgressCallback>,
) -> Result<Manifest, EngineError>
where
    R: RemoteFs + ?Sized,
    L: LocalFs + ?Sized,
{
    let mut manifest = Manifest::new(Direction::Pull, roots);
    info!(
        id = %manifest.id,
        source = %roots.source().display(),
        dest = %roots.dest().display(),
        "starting pull"
    );

    let source = stat_source(remote, roots.source())?;
    check_not_nested(remote.host_path(roots.source()), Some(roots.dest().to_path_buf()))?;
    match plan::check_root(local, roots.dest(), source.is_dir) {
        RootState::Ready => {}
        RootState::FileInPlaceOfDir if options.force => {
            warn!(path = %roots.dest().display(), "removing local file in place of destination directory");
            local
                .remove_file(roots.dest())
                .map_err(|e| EngineError::io("remove local", roots.dest(), e))?;
        }
        state => return Err(root_conflict(roots.dest(), state)),
    }

    let tree = enumerate_source(remote, roots, &source);
    manifest.warnings = tree.warnings;
    if let Some(cb) = callback {
        cb.on_started(&manifest, tree.files.len() + 1);
    }

    for dir in skeleton(&tree.directories, roots, source.is_dir) {
        local
            .mkdir_all(dir, LOCAL_DIR_MODE)
            .map_err(|e| EngineError::io("mkdir local", dir, e))?;
        manifest.directories_created += 1;
    }

    let policy = options.file_error_policy(Direction::Pull);
    for entry in &tree.files {
        let outcome = pull_entry(remote, local, entry, options, policy)?;
        if let Some(cb) = callback {
            cb.on_file_completed(&outcome);
        }
        manifest.files.push(outcome);
    }

    Ok(finish(manifest, callback))
}

/// Create a remote directory and any missing parents.
pub fn mkdir<R: RemoteFs + ?Sized>(remote: &R, path: &Path) -> Result<(), EngineError> {
    remote
        .mkdir_all(path, REMOTE_DIR_MODE)
        .map_err(|e| EngineError::io("mkdir remote", path, e))?;
    info!(path = %path.display(), "created remote directory");
    Ok(())
}

/// Recursively delete a remote path.
///
/// With `force`, a path that does not exist is not an error.
pub fn remove<R: RemoteFs + ?Sized>(remote: &R, path: &Path, force: bool) -> Result<(), EngineError> {
    match remote.remove_all(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed remote path");
            Ok(())
        }
        Err(e) if force && e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "nothing to remove");
            Ok(())
        }
        Err(e) => Err(EngineError::io("remove remote", path, e)),
    }
}

/// Describe a remote path: the children of a directory (sorted by name) or
/// the file itself.
pub fn list<R: RemoteFs + ?Sized>(remote: &R, path: &Path) -> Result<Vec<FileStat>, EngineError> {
    let stat = stat_source(remote, path)?;
    if !stat.is_dir {
        return Ok(vec![stat]);
    }
    let mut children = remote
        .read_dir(path)
        .map_err(|e| EngineError::io("list remote", path, e))?;
    children.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(children)
}

fn stat_source<S: TreeSource + ?Sized>(source: &S, path: &Path) -> Result<FileStat, EngineError> {
    source.stat(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            EngineError::SourceNotFound {
                path: path.to_path_buf(),
            }
        } else {
            EngineError::io("stat source", path, e)
        }
    })
}

/// Reject a destination that lies inside (or is) the source tree on the
/// same host.
fn check_not_nested(source: Option<PathBuf>, dest: Option<PathBuf>) -> Result<(), EngineError> {
    let (Some(source), Some(dest)) = (source, dest) else {
        return Ok(());
    };
    let source = resolve_existing_prefix(&source);
    let dest = resolve_existing_prefix(&dest);
    if dest.starts_with(&source) {
        return Err(EngineError::InvalidRoot {
            reason: format!(
                "destination {} lies inside source {}",
                dest.display(),
                source.display()
            ),
        });
    }
    Ok(())
}

fn root_conflict(dest_root: &Path, state: RootState) -> EngineError {
    let reason = match state {
        RootState::DirInPlaceOfFile => "destination is a directory but the source is a file",
        _ => "destination exists and is not a directory",
    };
    EngineError::Conflict {
        path: dest_root.to_path_buf(),
        reason,
    }
}

fn enumerate_source<S: TreeSource + ?Sized>(source: &S, roots: &TreeRoot, root: &FileStat) -> Enumeration {
    let tree = enumerate(source, roots).partition();
    debug!(
        directories = tree.directories.len(),
        files = tree.files.len(),
        warnings = tree.warnings.len(),
        is_dir = root.is_dir,
        "enumerated source"
    );
    tree
}

/// Destination directories to realise before any file moves. A single-file
/// source needs only the destination's parent.
fn skeleton<'a>(directories: &'a [Entry], roots: &'a TreeRoot, source_is_dir: bool) -> Vec<&'a Path> {
    if source_is_dir {
        directories.iter().map(|d| d.dest_path.as_path()).collect()
    } else {
        roots
            .dest()
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .into_iter()
            .collect()
    }
}

fn push_entry<R, L>(
    remote: &R,
    local: &L,
    entry: &Entry,
    options: &MirrorOptions,
    policy: FileErrorPolicy,
) -> Result<FileOutcome, EngineError>
where
    R: RemoteFs + ?Sized,
    L: LocalFs + ?Sized,
{
    if plan::is_excluded(entry, options) {
        debug!(path = %entry.source_path.display(), "excluding hidden file");
        return Ok(FileOutcome::new(entry, None, FileState::Excluded));
    }

    let decision = match plan::decide_push(entry, remote, local) {
        Ok(decision) => decision,
        Err(PlanFailure::Fatal(e)) => return Err(e),
        Err(PlanFailure::Entry(e)) => return settle(policy, entry, None, e),
    };

    match decision {
        SyncDecision::Skip => return Ok(FileOutcome::new(entry, Some(decision), FileState::Skipped)),
        SyncDecision::ReplaceAndTransfer => {
            if let Err(e) = remote.remove_all(&entry.dest_path) {
                return settle(
                    policy,
                    entry,
                    Some(decision),
                    EngineError::io("remove remote", &entry.dest_path, e),
                );
            }
        }
        SyncDecision::Transfer | SyncDecision::CreateDir => {}
    }

    match transfer::push_file(remote, entry) {
        Ok(bytes) => complete(local, remote, entry, decision, bytes, options, policy),
        Err(e) => settle(policy, entry, Some(decision), e),
    }
}

fn pull_entry<R, L>(
    remote: &R,
    local: &L,
    entry: &Entry,
    options: &MirrorOptions,
    policy: FileErrorPolicy,
) -> Result<FileOutcome, EngineError>
where
    R: RemoteFs + ?Sized,
    L: LocalFs + ?Sized,
{
    if plan::is_excluded(entry, options) {
        debug!(path = %entry.source_path.display(), "excluding hidden file");
        return Ok(FileOutcome::new(entry, None, FileState::Excluded));
    }

    let decision = match plan::decide_pull(entry, local) {
        Ok(decision) => decision,
        Err(PlanFailure::Fatal(e)) => return Err(e),
        Err(PlanFailure::Entry(e)) => return settle(policy, entry, None, e),
    };

    let modified = if options.preserve_mtime {
        remote.stat(&entry.source_path).ok().and_then(|s| s.modified)
    } else {
        None
    };

    match transfer::pull_file(remote, local, entry, modified) {
        Ok(bytes) => complete(remote, local, entry, decision, bytes, options, policy),
        Err(e) => settle(policy, entry, Some(decision), e),
    }
}

/// Record a transferred file, verifying it first when asked to.
fn complete<A, B>(
    source_fs: &A,
    dest_fs: &B,
    entry: &Entry,
    decision: SyncDecision,
    bytes: u64,
    options: &MirrorOptions,
    policy: FileErrorPolicy,
) -> Result<FileOutcome, EngineError>
where
    A: TreeSource + ?Sized,
    B: TreeSource + ?Sized,
{
    let mut outcome = FileOutcome::new(entry, Some(decision), FileState::Done);
    outcome.bytes = bytes;

    if let Some(algorithm) = options.verify {
        match checksums::verify_transfer(source_fs, &entry.source_path, dest_fs, &entry.dest_path, algorithm) {
            Ok(true) => outcome.verification_passed = Some(true),
            Ok(false) => {
                let err = EngineError::TransferFailed {
                    path: entry.dest_path.clone(),
                    reason: format!("{} checksum mismatch after transfer", algorithm),
                };
                let mut failed = settle(policy, entry, Some(decision), err)?;
                failed.bytes = bytes;
                failed.verification_passed = Some(false);
                return Ok(failed);
            }
            Err(e) => return settle(policy, entry, Some(decision), e),
        }
    }
    Ok(outcome)
}

/// Apply the per-file policy to a failure.
fn settle(
    policy: FileErrorPolicy,
    entry: &Entry,
    decision: Option<SyncDecision>,
    err: EngineError,
) -> Result<FileOutcome, EngineError> {
    match policy {
        FileErrorPolicy::Abort => Err(err),
        FileErrorPolicy::Continue => {
            warn!(path = %entry.source_path.display(), error = %err, "file failed, continuing");
            let mut outcome = FileOutcome::new(entry, decision, FileState::Failed);
            outcome.error_message = Some(err.to_string());
            Ok(outcome)
        }
    }
}

fn emit(
    manifest: &mut Manifest,
    event: &ProgressEvent,
    reporter: Option<&HttpProgressReporter>,
    callback: Option<&dyn ProgressCallback>,
) {
    if let Some(reporter) = reporter {
        reporter.send(event);
        manifest.progress_events.push(event.percent);
    }
    if let Some(cb) = callback {
        cb.on_progress(event);
    }
}

fn finish(mut manifest: Manifest, callback: Option<&dyn ProgressCallback>) -> Manifest {
    manifest.finished_at = Some(Utc::now());
    info!(
        id = %manifest.id,
        direction = %manifest.direction,
        transferred = manifest.transferred(),
        skipped = manifest.skipped(),
        excluded = manifest.excluded(),
        failed = manifest.failed(),
        bytes = manifest.bytes_transferred(),
        "{} finished",
        manifest.direction
    );
    if let Some(cb) = callback {
        cb.on_finished(&manifest);
    }
    manifest
}
