//! Local filesystem port backed by `std::fs`.
//!
//! Walking uses `walkdir` (sorted by file name, symlinks followed) so a
//! subtree that cannot be read shows up as a single error and the rest of the
//! tree is still produced. Symlink loops and dangling links are reported the
//! same way.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::port::{FileStat, LocalFile, LocalFs, TreeSource, WalkError, WalkItem};

/// The host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsLocalFs;

impl OsLocalFs {
    pub fn new() -> Self {
        OsLocalFs
    }
}

/// Build a `FileStat` from host metadata.
pub(crate) fn stat_from_metadata(path: &Path, metadata: &fs::Metadata) -> FileStat {
    let is_dir = metadata.is_dir();
    FileStat {
        path: path.to_path_buf(),
        is_dir,
        size: if is_dir { 0 } else { metadata.len() },
        mode: permission_bits(metadata),
        modified: metadata.modified().ok(),
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    match (metadata.is_dir(), metadata.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

/// Recursive `mkdir -p` honouring `mode` where the platform supports it.
pub(crate) fn create_dir_all_with_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path)
}

/// Resolve symlinks in the longest existing prefix of `path`; the part that
/// does not exist yet is appended unchanged.
pub(crate) fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut missing = Vec::new();
    let mut current = path;
    loop {
        if let Ok(resolved) = fs::canonicalize(current) {
            return missing
                .iter()
                .rev()
                .fold(resolved, |acc: PathBuf, part| acc.join(part));
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                current = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

impl TreeSource for OsLocalFs {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let metadata = fs::metadata(path)?;
        Ok(stat_from_metadata(path, &metadata))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<FileStat>> {
        let mut children = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let child = entry.path();
            let metadata = fs::metadata(&child)?;
            children.push(stat_from_metadata(&child, &metadata));
        }
        Ok(children)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(fs::File::open(path)?))
    }

    fn walk<'a>(&'a self, root: &Path) -> Box<dyn Iterator<Item = WalkItem> + 'a> {
        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();

        // A linked directory is descended into under the link's own path
        Box::new(walker.map(|item| match item {
            Ok(entry) => {
                let path = entry.path();
                entry
                    .metadata()
                    .map(|m| stat_from_metadata(path, &m))
                    .map_err(|e| WalkError {
                        path: path.to_path_buf(),
                        source: io::Error::from(e),
                    })
            }
            Err(e) => Err(WalkError {
                path: e.path().map(Path::to_path_buf).unwrap_or_default(),
                source: io::Error::from(e),
            }),
        }))
    }
}

impl LocalFs for OsLocalFs {
    fn create(&self, path: &Path) -> io::Result<Box<dyn LocalFile + '_>> {
        Ok(Box::new(fs::File::create(path)?))
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        create_dir_all_with_mode(path, mode)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn set_modified(&self, path: &Path, modified: SystemTime) -> io::Result<()> {
        filetime::set_file_mtime(path, filetime::FileTime::from_system_time(modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_walk_is_preorder_and_sorted() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("src");
        fs::create_dir_all(root.join("b")).expect("Failed to create b");
        fs::create_dir_all(root.join("a")).expect("Failed to create a");
        fs::write(root.join("a").join("one.txt"), b"1").expect("Failed to write one");
        fs::write(root.join("top.txt"), b"top").expect("Failed to write top");

        let fs_port = OsLocalFs::new();
        let paths: Vec<_> = fs_port
            .walk(&root)
            .map(|item| item.expect("walk item").path)
            .collect();

        assert_eq!(
            paths,
            vec![
                root.clone(),
                root.join("a"),
                root.join("a").join("one.txt"),
                root.join("b"),
                root.join("top.txt"),
            ]
        );
    }

    #[test]
    fn test_walk_of_single_file_yields_that_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file = temp_dir.path().join("only.bin");
        fs::write(&file, b"12345").expect("Failed to write file");

        let items: Vec<_> = OsLocalFs::new()
            .walk(&file)
            .map(|item| item.expect("walk item"))
            .collect();
        assert_eq!(items.len(), 1);
        assert!(!items[0].is_dir);
        assert_eq!(items[0].size, 5);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_descends_into_symlinked_directory() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let real = temp_dir.path().join("real");
        let root = temp_dir.path().join("src");
        fs::create_dir_all(&real).expect("Failed to create real");
        fs::create_dir_all(&root).expect("Failed to create src");
        fs::write(real.join("inside.txt"), b"inside").expect("Failed to write inside");
        symlink(&real, root.join("link")).expect("Failed to create symlink");

        let items: Vec<_> = OsLocalFs::new()
            .walk(&root)
            .map(|item| item.expect("walk item"))
            .collect();
        let paths: Vec<_> = items.iter().map(|s| s.path.clone()).collect();

        assert_eq!(
            paths,
            vec![root.clone(), root.join("link"), root.join("link").join("inside.txt")]
        );
        assert!(items[1].is_dir);
        assert_eq!(items[2].size, 6);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_reports_symlink_loop_and_dangling_link() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("src");
        fs::create_dir_all(&root).expect("Failed to create src");
        fs::write(root.join("keep.txt"), b"k").expect("Failed to write keep");
        symlink(&root, root.join("loop")).expect("Failed to create loop");
        symlink(temp_dir.path().join("gone"), root.join("dangling")).expect("Failed to create dangling");

        let items: Vec<_> = OsLocalFs::new().walk(&root).collect();
        let errors: Vec<_> = items
            .iter()
            .filter_map(|item| item.as_ref().err())
            .map(|e| e.path.clone())
            .collect();
        let files: Vec<_> = items
            .iter()
            .filter_map(|item| item.as_ref().ok())
            .filter(|s| !s.is_dir)
            .map(|s| s.path.clone())
            .collect();

        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&root.join("loop")));
        assert!(errors.contains(&root.join("dangling")));
        assert_eq!(files, vec![root.join("keep.txt")]);
    }

    #[test]
    fn test_create_write_sync_and_set_modified() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("out.txt");
        let fs_port = OsLocalFs::new();

        {
            let mut file = fs_port.create(&path).expect("Failed to create");
            file.write_all(b"payload").expect("Failed to write");
            file.sync_all().expect("Failed to sync");
        }

        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        fs_port.set_modified(&path, mtime).expect("Failed to set mtime");

        let stat = fs_port.stat(&path).expect("Failed to stat");
        assert_eq!(stat.size, 7);
        assert_eq!(stat.modified, Some(mtime));
    }

    #[test]
    fn test_resolve_existing_prefix_keeps_missing_tail() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let base = fs::canonicalize(temp_dir.path()).expect("Failed to canonicalize");
        let target = temp_dir.path().join("not").join("yet");

        assert_eq!(resolve_existing_prefix(&target), base.join("not").join("yet"));
        assert_eq!(resolve_existing_prefix(temp_dir.path()), base);
    }

    #[test]
    fn test_mkdir_all_creates_nested_directories() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let nested = temp_dir.path().join("x").join("y").join("z");
        OsLocalFs::new()
            .mkdir_all(&nested, 0o751)
            .expect("Failed to mkdir");
        assert!(nested.is_dir());
    }
}
