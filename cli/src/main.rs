//! treemirror - Command-line interface for the tree mirroring engine.
//!
//! Mirrors a directory tree to or from a remote filesystem endpoint and
//! offers a few single-path remote commands. Progress and summaries go to
//! stderr; `--ls` listings go to stdout.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use clap::{ArgGroup, Parser};
use mirror_engine::{
    connect, list, mkdir, pull, push, remove, ChecksumAlgorithm, FileErrorPolicy, FileOutcome,
    FileStat, FileState, Manifest, MirrorOptions, OsLocalFs, ProgressCallback, ProgressEvent,
    TreeRoot,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// treemirror - mirror directory trees to and from a remote filesystem
#[derive(Parser, Debug)]
#[command(name = "treemirror")]
#[command(version = "0.1.0")]
#[command(about = "Mirror directory trees between the local and a remote filesystem")]
#[command(group(
    ArgGroup::new("operation")
        .required(true)
        .args(["put", "get", "mkdir", "ls", "rm"])
))]
struct Args {
    /// Push LOCAL_SRC to REMOTE_DST
    #[arg(long)]
    put: bool,

    /// Pull REMOTE_SRC to LOCAL_DST
    #[arg(long)]
    get: bool,

    /// Create REMOTE_PATH and any missing parents
    #[arg(long)]
    mkdir: bool,

    /// List REMOTE_PATH
    #[arg(long)]
    ls: bool,

    /// Recursively delete REMOTE_PATH
    #[arg(long)]
    rm: bool,

    /// Remote filesystem endpoint (file:///mount/root, a bare path, or mem://)
    #[arg(long = "fs", value_name = "ENDPOINT", default_value = "file:///mnt/remote")]
    fs: String,

    /// Include hidden files (names starting with '.')
    #[arg(short = 'a', long = "all")]
    all: bool,

    /// Replace a conflicting destination file; with --rm, ignore missing paths
    #[arg(short, long)]
    force: bool,

    /// URL that receives progress updates as form POSTs
    #[arg(long, value_name = "URL")]
    progress: Option<String>,

    /// Exit non-zero when any file failed, even if the operation continued
    #[arg(long)]
    strict: bool,

    /// Record per-file failures and keep going (the default for --get)
    #[arg(long)]
    continue_on_error: bool,

    /// Verify each transferred file: md5, sha256 or blake3
    #[arg(long, value_name = "ALGORITHM")]
    verify: Option<String>,

    /// Write the per-file manifest as JSON
    #[arg(long, value_name = "PATH")]
    manifest: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Source and destination for --put/--get, or the remote path otherwise
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,
}

/// How a run that did not error ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunStatus {
    Success,
    /// Files failed while the operation kept going, and --strict was given
    PartialFailure,
}

/// CLI implementation of ProgressCallback for displaying mirror progress
struct CliProgress {
    verbose: bool,
    start_time: Instant,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            start_time: Instant::now(),
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn progress_bar(percent: f64) -> String {
        let filled = ((percent / 5.0) as usize).min(20);
        format!("[{}{}]", "=".repeat(filled), " ".repeat(20 - filled))
    }
}

impl ProgressCallback for CliProgress {
    fn on_started(&self, manifest: &Manifest, total_units: usize) {
        eprintln!("Starting {}...", manifest.direction);
        eprintln!("  Source: {}", manifest.source_root.display());
        eprintln!("  Destination: {}", manifest.dest_root.display());
        eprintln!("  Files: {}", total_units.saturating_sub(1));
        if !manifest.warnings.is_empty() {
            eprintln!("  Unreadable subtrees skipped: {}", manifest.warnings.len());
        }
        eprintln!();
    }

    fn on_file_completed(&self, outcome: &FileOutcome) {
        if self.verbose {
            let status = match outcome.state {
                FileState::Done => "Done",
                FileState::Skipped => "Skipped",
                FileState::Excluded => "Excluded",
                FileState::Failed => "Failed",
            };
            eprintln!("{:>8}: {}", status, outcome.dest_path.display());
        }
    }

    fn on_progress(&self, event: &ProgressEvent) {
        eprint!(
            "\rProgress: {} {}%",
            Self::progress_bar(event.percent),
            event.formatted_percent()
        );
        let _ = io::stderr().flush();
    }

    fn on_finished(&self, manifest: &Manifest) {
        eprintln!();
        eprintln!("Mirror complete!");
        eprintln!(
            "Summary: {} transferred, {} skipped, {} excluded, {} failed",
            manifest.transferred(),
            manifest.skipped(),
            manifest.excluded(),
            manifest.failed()
        );

        let mismatches: Vec<_> = manifest
            .files
            .iter()
            .filter(|f| f.verification_passed == Some(false))
            .collect();
        let verified = manifest
            .files
            .iter()
            .filter(|f| f.verification_passed == Some(true))
            .count();
        if verified > 0 || !mismatches.is_empty() {
            eprintln!("Verification: {} OK, {} mismatch", verified, mismatches.len());
        }

        eprintln!("Bytes transferred: {}", Self::format_bytes(manifest.bytes_transferred()));
        eprintln!("Elapsed: {:.1}s", self.start_time.elapsed().as_secs_f64());

        if manifest.has_failures() {
            eprintln!();
            eprintln!("Failed files:");
            for file in manifest.files.iter().filter(|f| f.state == FileState::Failed) {
                eprintln!(
                    "  {}: {}",
                    file.source_path.display(),
                    file.error_message.as_deref().unwrap_or("(unknown error)")
                );
            }
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let stdout = io::stdout();
    let exit_code = match run_cli(&args, &mut stdout.lock()) {
        Ok(RunStatus::Success) => 0,
        Ok(RunStatus::PartialFailure) => 1,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Log to stderr; RUST_LOG overrides the level picked from --verbose.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args, out: &mut dyn Write) -> Result<RunStatus> {
    let remote = connect(&args.fs).with_context(|| format!("cannot connect to {}", args.fs))?;
    debug!(endpoint = %args.fs, "connected");

    if args.put || args.get {
        let (src, dst) = match args.paths.as_slice() {
            [src, dst] => (src, dst),
            _ => bail!("--put and --get take exactly two paths: SOURCE DESTINATION"),
        };
        let options = mirror_options(args)?;
        let local = OsLocalFs::new();
        let progress = CliProgress::new(args.verbose);

        let manifest = if args.put {
            let roots = TreeRoot::new(local_path(src)?, remote_path(dst))?;
            push(remote.as_ref(), &local, &roots, &options, Some(&progress))?
        } else {
            let roots = TreeRoot::new(remote_path(src), local_path(dst)?)?;
            pull(remote.as_ref(), &local, &roots, &options, Some(&progress))?
        };

        if let Some(path) = &args.manifest {
            manifest
                .write_json(path)
                .with_context(|| format!("cannot write manifest {}", path.display()))?;
        }

        return Ok(if args.strict && manifest.has_failures() {
            RunStatus::PartialFailure
        } else {
            RunStatus::Success
        });
    }

    let target = match args.paths.as_slice() {
        [path] => remote_path(path),
        _ => bail!("--mkdir, --ls and --rm take exactly one remote path"),
    };

    if args.mkdir {
        mkdir(remote.as_ref(), &target)?;
    } else if args.rm {
        remove(remote.as_ref(), &target, args.force)?;
    } else {
        for stat in list(remote.as_ref(), &target)? {
            writeln!(out, "{}", format_stat_row(&stat))?;
        }
        writeln!(out)?;
    }
    Ok(RunStatus::Success)
}

fn mirror_options(args: &Args) -> Result<MirrorOptions> {
    let verify = match &args.verify {
        Some(name) => Some(
            name.parse::<ChecksumAlgorithm>()
                .map_err(anyhow::Error::msg)?,
        ),
        None => None,
    };

    Ok(MirrorOptions {
        include_hidden: args.all,
        force: args.force,
        progress_endpoint: args.progress.clone(),
        on_file_error: args.continue_on_error.then_some(FileErrorPolicy::Continue),
        verify,
        ..MirrorOptions::default()
    })
}

fn local_path(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("invalid local path {}", path.display()))
}

/// Remote paths are always absolute in the remote namespace.
fn remote_path(path: &Path) -> PathBuf {
    Path::new("/").join(path)
}

/// One `--ls` row: mode, size, modification time, name.
fn format_stat_row(stat: &FileStat) -> String {
    let modified = stat
        .modified
        .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    format!(
        "{:<13} {:<8} {:<20} {:<30}",
        stat.mode_string(),
        stat.size,
        modified,
        stat.name()
    )
}
