//! Tree enumeration.
//!
//! Walks a source tree through its port and turns every node into an
//! [`Entry`] with its destination path already translated. Unreadable
//! subtrees are logged, remembered as warnings and skipped.

use std::path::Path;

use tracing::warn;

use crate::model::Entry;
use crate::paths::TreeRoot;
use crate::port::{TreeSource, WalkItem};

/// Lazy depth-first stream of entries under one tree root.
pub struct TreeEnumerator<'a> {
    walk: Box<dyn Iterator<Item = WalkItem> + 'a>,
    roots: &'a TreeRoot,
    warnings: Vec<String>,
}

/// Entries split into the directory skeleton and the files, each kept in
/// enumeration order.
#[derive(Debug, Default)]
pub struct Enumeration {
    pub directories: Vec<Entry>,
    pub files: Vec<Entry>,
    pub warnings: Vec<String>,
}

/// Start walking `roots.source()` on `source`.
pub fn enumerate<'a, S: TreeSource + ?Sized>(source: &'a S, roots: &'a TreeRoot) -> TreeEnumerator<'a> {
    TreeEnumerator {
        walk: source.walk(roots.source()),
        roots,
        warnings: Vec::new(),
    }
}

impl<'a> TreeEnumerator<'a> {
    /// Subtrees skipped so far.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn skip(&mut self, path: &Path, reason: &dyn std::fmt::Display) {
        warn!(path = %path.display(), error = %reason, "skipping unreadable subtree");
        self.warnings
            .push(format!("{}: {}", path.display(), reason));
    }

    /// Drain the walk into directories and files.
    pub fn partition(mut self) -> Enumeration {
        let mut out = Enumeration::default();
        while let Some(entry) = self.next() {
            if entry.is_dir {
                out.directories.push(entry);
            } else {
                out.files.push(entry);
            }
        }
        out.warnings = self.warnings;
        out
    }
}

impl<'a> Iterator for TreeEnumerator<'a> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        loop {
            match self.walk.next()? {
                Ok(stat) => match self.roots.translate(&stat.path) {
                    Ok(dest_path) => {
                        return Some(Entry {
                            source_path: stat.path,
                            dest_path,
                            is_dir: stat.is_dir,
                            size: stat.size,
                        })
                    }
                    Err(e) => self.skip(&stat.path, &e),
                },
                Err(e) => self.skip(&e.path, &e.source),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::OsLocalFs;
    use crate::remote::MemoryRemote;
    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn test_enumerate_local_tree_translates_paths() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir_all(src.join("sub")).expect("Failed to create sub");
        fs::write(src.join("a.txt"), b"aaa").expect("Failed to write a");
        fs::write(src.join("sub").join("b.txt"), b"bb").expect("Failed to write b");

        let roots = TreeRoot::new(&src, "/backup/set1").unwrap();
        let local = OsLocalFs::new();
        let plan = enumerate(&local, &roots).partition();

        let dirs: Vec<_> = plan.directories.iter().map(|e| e.dest_path.clone()).collect();
        assert_eq!(
            dirs,
            vec![PathBuf::from("/backup/set1"), PathBuf::from("/backup/set1/sub")]
        );

        let files: Vec<_> = plan.files.iter().map(|e| (e.dest_path.clone(), e.size)).collect();
        assert_eq!(
            files,
            vec![
                (PathBuf::from("/backup/set1/a.txt"), 3),
                (PathBuf::from("/backup/set1/sub/b.txt"), 2),
            ]
        );
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_single_file_root_yields_one_entry() {
        let remote = MemoryRemote::new();
        remote.insert_file("/data/report.csv", "1,2,3");
        let roots = TreeRoot::new("/data/report.csv", "/tmp/report.csv").unwrap();

        let entries: Vec<_> = enumerate(&remote, &roots).collect();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].is_dir);
        assert_eq!(entries[0].dest_path, PathBuf::from("/tmp/report.csv"));
        assert_eq!(entries[0].size, 5);
    }

    #[test]
    fn test_unreadable_subtree_becomes_warning() {
        let remote = MemoryRemote::new();
        remote.insert_file("/d/locked/x.txt", "x");
        remote.insert_file("/d/open/y.txt", "y");
        remote.deny("/d/locked");
        let roots = TreeRoot::new("/d", "/out").unwrap();

        let plan = enumerate(&remote, &roots).partition();
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].contains("/d/locked"));
        assert_eq!(plan.files.len(), 1);
        assert_eq!(plan.files[0].dest_path, PathBuf::from("/out/open/y.txt"));
    }
}
