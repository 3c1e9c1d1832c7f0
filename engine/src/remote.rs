//! Remote filesystem adapters.
//!
//! The remote filesystem protocol itself lives outside this crate. Two
//! adapters implement [`RemoteFs`]:
//! - [`MountedRemote`]: the remote namespace is exposed by a host mount point
//!   (FUSE or NFS gateway); remote absolute paths resolve under that root.
//! - [`MemoryRemote`]: an in-memory tree that records every mutating call.
//!
//! [`connect`] picks one from an endpoint string.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use tracing::debug;

use crate::error::EngineError;
use crate::local::{create_dir_all_with_mode, stat_from_metadata};
use crate::port::{FileStat, RemoteFs, TreeSource};

/// Parsed form of the `--fs` endpoint string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `file:///mount/root` or a bare path
    Mounted(PathBuf),
    /// `mem://`
    Memory,
}

impl Endpoint {
    pub fn parse(endpoint: &str) -> Result<Self, EngineError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(EngineError::Connection {
                endpoint: endpoint.to_string(),
                reason: "endpoint is empty".to_string(),
            });
        }
        if let Some(rest) = endpoint.strip_prefix("file://") {
            return Ok(Endpoint::Mounted(PathBuf::from(rest)));
        }
        if endpoint.starts_with("mem://") {
            return Ok(Endpoint::Memory);
        }
        if let Some((scheme, _)) = endpoint.split_once("://") {
            return Err(EngineError::Connection {
                endpoint: endpoint.to_string(),
                reason: format!("unsupported scheme '{}'", scheme),
            });
        }
        Ok(Endpoint::Mounted(PathBuf::from(endpoint)))
    }
}

/// Open a session against the remote endpoint.
pub fn connect(endpoint: &str) -> Result<Box<dyn RemoteFs>, EngineError> {
    match Endpoint::parse(endpoint)? {
        Endpoint::Mounted(root) => Ok(Box::new(MountedRemote::connect(root)?)),
        Endpoint::Memory => Ok(Box::new(MemoryRemote::new())),
    }
}

/// Map a remote absolute path onto its normalised component form.
fn normalize(path: &Path) -> io::Result<PathBuf> {
    let mut out = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => out.push(part),
            Component::ParentDir | Component::Prefix(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unsupported remote path: {}", path.display()),
                ));
            }
        }
    }
    Ok(out)
}

/// Remote filesystem exposed through a local mount point.
#[derive(Debug, Clone)]
pub struct MountedRemote {
    mount_root: PathBuf,
}

impl MountedRemote {
    pub fn connect(mount_root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let mount_root = mount_root.into();
        match fs::metadata(&mount_root) {
            Ok(metadata) if metadata.is_dir() => {
                debug!(mount = %mount_root.display(), "connected to mounted remote");
                Ok(MountedRemote { mount_root })
            }
            Ok(_) => Err(EngineError::Connection {
                endpoint: mount_root.display().to_string(),
                reason: "mount root is not a directory".to_string(),
            }),
            Err(e) => Err(EngineError::Connection {
                endpoint: mount_root.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    pub fn mount_root(&self) -> &Path {
        &self.mount_root
    }

    fn resolve(&self, remote: &Path) -> io::Result<PathBuf> {
        let normalized = normalize(remote)?;
        let relative = normalized.strip_prefix("/").unwrap_or(&normalized);
        Ok(self.mount_root.join(relative))
    }
}

impl TreeSource for MountedRemote {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let host = self.resolve(path)?;
        let metadata = fs::metadata(&host)?;
        Ok(stat_from_metadata(path, &metadata))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<FileStat>> {
        let host = self.resolve(path)?;
        let mut children = Vec::new();
        for entry in fs::read_dir(&host)? {
            let entry = entry?;
            let metadata = fs::metadata(entry.path())?;
            children.push(stat_from_metadata(&path.join(entry.file_name()), &metadata));
        }
        Ok(children)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(fs::File::open(self.resolve(path)?)?))
    }
}

impl RemoteFs for MountedRemote {
    fn copy_from_local(&self, local: &Path, remote: &Path) -> io::Result<u64> {
        let host = self.resolve(remote)?;
        if fs::symlink_metadata(&host).is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("remote file exists: {}", remote.display()),
            ));
        }
        fs::copy(local, &host)
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        create_dir_all_with_mode(&self.resolve(path)?, mode)
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        let host = self.resolve(path)?;
        if host == self.mount_root {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "refusing to remove the remote root",
            ));
        }
        if fs::symlink_metadata(&host)?.is_dir() {
            fs::remove_dir_all(&host)
        } else {
            fs::remove_file(&host)
        }
    }

    fn host_path(&self, path: &Path) -> Option<PathBuf> {
        self.resolve(path).ok()
    }
}

/// One mutating call observed by a [`MemoryRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    Mkdir(PathBuf),
    Copy { local: PathBuf, remote: PathBuf },
    Remove(PathBuf),
}

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Clone)]
struct MemNode {
    node: Node,
    mode: u32,
    modified: SystemTime,
}

#[derive(Debug, Default)]
struct MemState {
    nodes: BTreeMap<PathBuf, MemNode>,
    ops: Vec<RemoteOp>,
    denied: Vec<PathBuf>,
}

/// In-memory remote filesystem.
///
/// Creating a file requires its parent directory to exist and fails when the
/// file is already present, the same contract a namenode-backed client has.
#[derive(Debug)]
pub struct MemoryRemote {
    state: Mutex<MemState>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        let mut state = MemState::default();
        state.nodes.insert(
            PathBuf::from("/"),
            MemNode {
                node: Node::Dir,
                mode: 0o755,
                modified: SystemTime::now(),
            },
        );
        MemoryRemote {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed a file (and its parent directories) without recording an op.
    pub fn insert_file(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        let path = match normalize(path.as_ref()) {
            Ok(p) => p,
            Err(_) => return,
        };
        let mut state = self.lock();
        if let Some(parent) = path.parent() {
            insert_dirs(&mut state, parent);
        }
        state.nodes.insert(
            path,
            MemNode {
                node: Node::File(contents.into()),
                mode: 0o644,
                modified: SystemTime::now(),
            },
        );
    }

    /// Seed a directory (and its parents) without recording an op.
    pub fn insert_dir(&self, path: impl AsRef<Path>) {
        if let Ok(path) = normalize(path.as_ref()) {
            insert_dirs(&mut self.lock(), &path);
        }
    }

    /// Make every read or write of exactly `path` fail with `PermissionDenied`.
    /// `stat` keeps working.
    pub fn deny(&self, path: impl AsRef<Path>) {
        if let Ok(path) = normalize(path.as_ref()) {
            self.lock().denied.push(path);
        }
    }

    pub fn ops(&self) -> Vec<RemoteOp> {
        self.lock().ops.clone()
    }

    /// Remote paths written by `copy_from_local`, in call order.
    pub fn copies(&self) -> Vec<PathBuf> {
        self.lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                RemoteOp::Copy { remote, .. } => Some(remote.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_ops(&self) {
        self.lock().ops.clear();
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let path = normalize(path.as_ref()).ok()?;
        match &self.lock().nodes.get(&path)?.node {
            Node::File(bytes) => Some(bytes.clone()),
            Node::Dir => None,
        }
    }

    pub fn is_dir(&self, path: impl AsRef<Path>) -> bool {
        normalize(path.as_ref())
            .ok()
            .and_then(|p| self.lock().nodes.get(&p).map(|n| matches!(n.node, Node::Dir)))
            .unwrap_or(false)
    }

    fn check_allowed(state: &MemState, path: &Path) -> io::Result<()> {
        if state.denied.iter().any(|d| d == path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {}", path.display()),
            ));
        }
        Ok(())
    }
}

fn insert_dirs(state: &mut MemState, path: &Path) {
    for ancestor in path.ancestors() {
        state.nodes.entry(ancestor.to_path_buf()).or_insert(MemNode {
            node: Node::Dir,
            mode: 0o755,
            modified: SystemTime::now(),
        });
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

fn mem_stat(path: &Path, node: &MemNode) -> FileStat {
    let (is_dir, size) = match &node.node {
        Node::Dir => (true, 0),
        Node::File(bytes) => (false, bytes.len() as u64),
    };
    FileStat {
        path: path.to_path_buf(),
        is_dir,
        size,
        mode: node.mode,
        modified: Some(node.modified),
    }
}

impl TreeSource for MemoryRemote {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let path = normalize(path)?;
        let state = self.lock();
        let node = state.nodes.get(&path).ok_or_else(|| not_found(&path))?;
        Ok(mem_stat(&path, node))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<FileStat>> {
        let path = normalize(path)?;
        let state = self.lock();
        Self::check_allowed(&state, &path)?;
        match state.nodes.get(&path).map(|n| &n.node) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("not a directory: {}", path.display()),
                ))
            }
            None => return Err(not_found(&path)),
        }
        Ok(state
            .nodes
            .iter()
            .filter(|(p, _)| p.parent() == Some(path.as_path()))
            .map(|(p, n)| mem_stat(p, n))
            .collect())
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + '_>> {
        let path = normalize(path)?;
        let state = self.lock();
        Self::check_allowed(&state, &path)?;
        match state.nodes.get(&path).map(|n| &n.node) {
            Some(Node::File(bytes)) => Ok(Box::new(Cursor::new(bytes.clone()))),
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("is a directory: {}", path.display()),
            )),
            None => Err(not_found(&path)),
        }
    }
}

impl RemoteFs for MemoryRemote {
    fn copy_from_local(&self, local: &Path, remote: &Path) -> io::Result<u64> {
        let remote = normalize(remote)?;
        let bytes = fs::read(local)?;
        let mut state = self.lock();
        Self::check_allowed(&state, &remote)?;
        if state.nodes.contains_key(&remote) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("remote file exists: {}", remote.display()),
            ));
        }
        let parent_is_dir = remote
            .parent()
            .and_then(|p| state.nodes.get(p))
            .map(|n| matches!(n.node, Node::Dir))
            .unwrap_or(false);
        if !parent_is_dir {
            return Err(not_found(remote.parent().unwrap_or(&remote)));
        }
        let len = bytes.len() as u64;
        state.nodes.insert(
            remote.clone(),
            MemNode {
                node: Node::File(bytes),
                mode: 0o644,
                modified: SystemTime::now(),
            },
        );
        state.ops.push(RemoteOp::Copy {
            local: local.to_path_buf(),
            remote,
        });
        Ok(len)
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        let path = normalize(path)?;
        let mut state = self.lock();
        Self::check_allowed(&state, &path)?;
        let ancestors: Vec<PathBuf> = path.ancestors().map(Path::to_path_buf).collect();
        for ancestor in ancestors.iter().rev() {
            match state.nodes.get(ancestor).map(|n| &n.node) {
                Some(Node::Dir) => {}
                Some(Node::File(_)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("file exists where a directory is needed: {}", ancestor.display()),
                    ))
                }
                None => {
                    state.nodes.insert(
                        ancestor.clone(),
                        MemNode {
                            node: Node::Dir,
                            mode,
                            modified: SystemTime::now(),
                        },
                    );
                }
            }
        }
        state.ops.push(RemoteOp::Mkdir(path));
        Ok(())
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        let path = normalize(path)?;
        let mut state = self.lock();
        Self::check_allowed(&state, &path)?;
        if path == Path::new("/") {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "refusing to remove the remote root",
            ));
        }
        if !state.nodes.contains_key(&path) {
            return Err(not_found(&path));
        }
        state.nodes.retain(|p, _| !p.starts_with(&path));
        state.ops.push(RemoteOp::Remove(path));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse() {
        assert_eq!(
            Endpoint::parse("file:///mnt/remote").unwrap(),
            Endpoint::Mounted(PathBuf::from("/mnt/remote"))
        );
        assert_eq!(
            Endpoint::parse("/mnt/remote").unwrap(),
            Endpoint::Mounted(PathBuf::from("/mnt/remote"))
        );
        assert_eq!(Endpoint::parse("mem://").unwrap(), Endpoint::Memory);
        assert!(Endpoint::parse("hdfs://namenode:9000").is_err());
        assert!(Endpoint::parse("  ").is_err());
    }

    #[test]
    fn test_connect_to_missing_mount_is_connection_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let missing = temp_dir.path().join("nope");
        let err = MountedRemote::connect(&missing).unwrap_err();
        assert!(err.is_connection());
    }

    #[test]
    fn test_mounted_remote_resolves_under_mount_root() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let remote = MountedRemote::connect(temp_dir.path()).expect("connect");

        remote
            .mkdir_all(Path::new("/backup/set1"), 0o755)
            .expect("mkdir");
        assert!(temp_dir.path().join("backup").join("set1").is_dir());

        let local = temp_dir.path().join("local.txt");
        fs::write(&local, b"abc").expect("write local");
        remote
            .copy_from_local(&local, Path::new("/backup/set1/a.txt"))
            .expect("copy");

        let stat = remote.stat(Path::new("/backup/set1/a.txt")).expect("stat");
        assert_eq!(stat.path, PathBuf::from("/backup/set1/a.txt"));
        assert_eq!(stat.size, 3);

        // Existing files are never clobbered by a copy
        assert!(remote
            .copy_from_local(&local, Path::new("/backup/set1/a.txt"))
            .is_err());
        assert!(remote.stat(Path::new("/../etc")).is_err());
    }

    #[test]
    fn test_memory_remote_requires_parent_for_copy() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let local = temp_dir.path().join("f.txt");
        fs::write(&local, b"x").expect("write");

        let remote = MemoryRemote::new();
        assert!(remote
            .copy_from_local(&local, Path::new("/missing/f.txt"))
            .is_err());

        remote.mkdir_all(Path::new("/missing"), 0o755).expect("mkdir");
        remote
            .copy_from_local(&local, Path::new("/missing/f.txt"))
            .expect("copy");
        assert_eq!(remote.contents("/missing/f.txt"), Some(b"x".to_vec()));
        assert_eq!(remote.copies(), vec![PathBuf::from("/missing/f.txt")]);
    }

    #[test]
    fn test_memory_remote_remove_all_and_walk() {
        let remote = MemoryRemote::new();
        remote.insert_file("/d/a.txt", "a");
        remote.insert_file("/d/sub/b.txt", "bb");

        let walked: Vec<_> = remote
            .walk(Path::new("/d"))
            .map(|item| item.expect("walk item").path)
            .collect();
        assert_eq!(
            walked,
            vec![
                PathBuf::from("/d"),
                PathBuf::from("/d/a.txt"),
                PathBuf::from("/d/sub"),
                PathBuf::from("/d/sub/b.txt"),
            ]
        );

        remote.remove_all(Path::new("/d/sub")).expect("remove");
        assert!(remote.stat(Path::new("/d/sub/b.txt")).is_err());
        assert!(remote.remove_all(Path::new("/d/sub")).is_err());
        assert!(remote.remove_all(Path::new("/")).is_err());
    }

    #[test]
    fn test_denied_directory_is_reported_and_skipped_by_walk() {
        let remote = MemoryRemote::new();
        remote.insert_file("/d/bad/x.txt", "x");
        remote.insert_file("/d/good/y.txt", "y");
        remote.deny("/d/bad");

        let items: Vec<_> = remote.walk(Path::new("/d")).collect();
        let errors = items.iter().filter(|i| i.is_err()).count();
        let paths: Vec<_> = items
            .into_iter()
            .filter_map(Result::ok)
            .map(|s| s.path)
            .collect();

        assert_eq!(errors, 1);
        assert!(paths.contains(&PathBuf::from("/d/good/y.txt")));
        assert!(!paths.contains(&PathBuf::from("/d/bad/x.txt")));
    }
}
