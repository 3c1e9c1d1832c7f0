//! Filesystem access ports.
//!
//! The engine never touches a filesystem directly. It goes through these
//! traits so the same planner drives both directions of travel:
//! - `TreeSource`: the read side shared by both filesystems (stat, list, open, walk)
//! - `RemoteFs`: the remote filesystem client
//! - `LocalFs`: the local filesystem
//!
//! All calls are blocking and used from a single thread.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Metadata for one file or directory, in the namespace of the filesystem
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// Absolute path in the producing filesystem's namespace
    pub path: PathBuf,
    pub is_dir: bool,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// Permission bits (`0o755` style)
    pub mode: u32,
    pub modified: Option<SystemTime>,
}

impl FileStat {
    /// Base name of the entry; the full path for roots such as `/`.
    pub fn name(&self) -> String {
        match self.path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => self.path.display().to_string(),
        }
    }

    /// Render the mode as `drwxr-xr-x` / `-rw-r--r--`.
    pub fn mode_string(&self) -> String {
        let mut s = String::with_capacity(10);
        s.push(if self.is_dir { 'd' } else { '-' });
        for shift in [6, 3, 0] {
            let bits = (self.mode >> shift) & 0o7;
            s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        s
    }
}

/// A subtree that could not be read during a walk.
#[derive(Debug)]
pub struct WalkError {
    pub path: PathBuf,
    pub source: io::Error,
}

pub type WalkItem = Result<FileStat, WalkError>;

/// Read-side capabilities shared by the local and remote filesystems.
pub trait TreeSource {
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// List the direct children of a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<FileStat>>;

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + '_>>;

    /// Depth-first, pre-order walk of `root` and everything below it.
    ///
    /// Siblings are visited in lexical order. A directory that cannot be
    /// listed yields one `Err` item and its subtree is abandoned; the walk
    /// continues with the next sibling.
    fn walk<'a>(&'a self, root: &Path) -> Box<dyn Iterator<Item = WalkItem> + 'a> {
        Box::new(DepthFirst::new(self, root))
    }
}

/// Remote filesystem client.
pub trait RemoteFs: TreeSource {
    /// Read a whole remote file into memory.
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.open(path)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Copy a local file into a new remote file. Fails if `remote` exists.
    fn copy_from_local(&self, local: &Path, remote: &Path) -> io::Result<u64>;

    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()>;

    fn remove_all(&self, path: &Path) -> io::Result<()>;

    /// Where `path` lives on the local host, for remotes that share the
    /// host namespace. None when the remote is elsewhere.
    fn host_path(&self, _path: &Path) -> Option<PathBuf> {
        None
    }
}

/// A local file opened for writing.
///
/// Closing happens on drop; `sync_all` is the durability point.
pub trait LocalFile: Write {
    fn sync_all(&mut self) -> io::Result<()>;
}

impl LocalFile for std::fs::File {
    fn sync_all(&mut self) -> io::Result<()> {
        std::fs::File::sync_all(self)
    }
}

/// Local filesystem primitives.
pub trait LocalFs: TreeSource {
    /// Create (or truncate) a file for writing.
    fn create(&self, path: &Path) -> io::Result<Box<dyn LocalFile + '_>>;

    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn set_modified(&self, path: &Path, modified: SystemTime) -> io::Result<()>;
}

/// Generic walker built on `stat` + `read_dir`.
pub struct DepthFirst<'a, S: ?Sized> {
    source: &'a S,
    root: Option<PathBuf>,
    stack: Vec<FileStat>,
    pending: Option<WalkError>,
}

impl<'a, S: TreeSource + ?Sized> DepthFirst<'a, S> {
    pub fn new(source: &'a S, root: &Path) -> Self {
        DepthFirst {
            source,
            root: Some(root.to_path_buf()),
            stack: Vec::new(),
            pending: None,
        }
    }

    fn descend(&mut self, stat: FileStat) -> FileStat {
        if stat.is_dir {
            match self.source.read_dir(&stat.path) {
                Ok(mut children) => {
                    // Reverse order so the smallest name is popped first
                    children.sort_by(|a, b| b.path.cmp(&a.path));
                    self.stack.extend(children);
                }
                Err(e) => {
                    self.pending = Some(WalkError {
                        path: stat.path.clone(),
                        source: e,
                    });
                }
            }
        }
        stat
    }
}

impl<'a, S: TreeSource + ?Sized> Iterator for DepthFirst<'a, S> {
    type Item = WalkItem;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.take() {
            return Some(Err(err));
        }
        if let Some(root) = self.root.take() {
            return match self.source.stat(&root) {
                Ok(stat) => Some(Ok(self.descend(stat))),
                Err(e) => Some(Err(WalkError {
                    path: root,
                    source: e,
                })),
            };
        }
        let stat = self.stack.pop()?;
        Some(Ok(self.descend(stat)))
    }
}
