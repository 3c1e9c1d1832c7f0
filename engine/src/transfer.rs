//! Byte-level transfer of a single file.
//!
//! Push is one whole-file copy call into the remote port. Pull reads the
//! remote file into memory, then creates, writes, syncs and closes the local
//! file. A failed local write removes the partial file so a retry never
//! mistakes it for a good copy.

use std::path::Path;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::error::EngineError;
use crate::model::Entry;
use crate::port::{LocalFile, LocalFs, RemoteFs};

/// Copy one local file into the remote filesystem.
pub fn push_file<R: RemoteFs + ?Sized>(remote: &R, entry: &Entry) -> Result<u64, EngineError> {
    let bytes = remote
        .copy_from_local(&entry.source_path, &entry.dest_path)
        .map_err(|e| EngineError::io("copy to remote", &entry.dest_path, e))?;
    debug!(path = %entry.dest_path.display(), bytes, "pushed file");
    Ok(bytes)
}

/// Fetch one remote file onto the local filesystem.
///
/// `modified` is applied to the written file when given; failing to set it
/// is only logged.
pub fn pull_file<R, L>(
    remote: &R,
    local: &L,
    entry: &Entry,
    modified: Option<SystemTime>,
) -> Result<u64, EngineError>
where
    R: RemoteFs + ?Sized,
    L: LocalFs + ?Sized,
{
    let content = remote
        .read_file(&entry.source_path)
        .map_err(|e| EngineError::io("read remote", &entry.source_path, e))?;

    write_local(local, &entry.dest_path, &content)?;

    if let Some(mtime) = modified {
        if let Err(e) = local.set_modified(&entry.dest_path, mtime) {
            warn!(path = %entry.dest_path.display(), error = %e, "could not preserve modification time");
        }
    }
    debug!(path = %entry.dest_path.display(), bytes = content.len(), "pulled file");
    Ok(content.len() as u64)
}

/// Create, write, sync and close. Any failure after creation removes the file.
fn write_local<L: LocalFs + ?Sized>(local: &L, path: &Path, content: &[u8]) -> Result<(), EngineError> {
    let mut file = local
        .create(path)
        .map_err(|e| EngineError::io("create", path, e))?;

    let written = write_synced(file.as_mut(), path, content);
    drop(file);

    if let Err(err) = written {
        if let Err(e) = local.remove_file(path) {
            warn!(path = %path.display(), error = %e, "could not remove partial file");
        }
        return Err(err);
    }
    Ok(())
}

fn write_synced(file: &mut dyn LocalFile, path: &Path, content: &[u8]) -> Result<(), EngineError> {
    file.write_all(content)
        .map_err(|e| EngineError::io("write", path, e))?;
    file.flush().map_err(|e| EngineError::io("flush", path, e))?;
    file.sync_all().map_err(|e| EngineError::io("sync", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::OsLocalFs;
    use crate::port::{FileStat, TreeSource};
    use crate::remote::MemoryRemote;
    use std::fs;
    use std::io::{self, Read, Write};
    use std::path::PathBuf;
    use std::time::Duration;

    /// Local port whose files accept a few bytes and then fail.
    struct FailingLocal {
        inner: OsLocalFs,
    }

    struct FailingFile {
        inner: fs::File,
        budget: usize,
    }

    impl Write for FailingFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            self.inner.write(&buf[..n])
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl LocalFile for FailingFile {
        fn sync_all(&mut self) -> io::Result<()> {
            self.inner.sync_all()
        }
    }

    impl TreeSource for FailingLocal {
        fn stat(&self, path: &Path) -> io::Result<FileStat> {
            self.inner.stat(path)
        }
        fn read_dir(&self, path: &Path) -> io::Result<Vec<FileStat>> {
            self.inner.read_dir(path)
        }
        fn open(&self, path: &Path) -> io::Result<Box<dyn Read + '_>> {
            self.inner.open(path)
        }
    }

    impl LocalFs for FailingLocal {
        fn create(&self, path: &Path) -> io::Result<Box<dyn LocalFile + '_>> {
            Ok(Box::new(FailingFile {
                inner: fs::File::create(path)?,
                budget: 3,
            }))
        }
        fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
            self.inner.mkdir_all(path, mode)
        }
        fn remove_file(&self, path: &Path) -> io::Result<()> {
            self.inner.remove_file(path)
        }
        fn set_modified(&self, path: &Path, modified: SystemTime) -> io::Result<()> {
            self.inner.set_modified(path, modified)
        }
    }

    fn pull_entry(dest: PathBuf) -> Entry {
        Entry {
            source_path: PathBuf::from("/remote/data.bin"),
            dest_path: dest,
            is_dir: false,
            size: 10,
        }
    }

    #[test]
    fn test_pull_writes_content_and_mtime() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let remote = MemoryRemote::new();
        remote.insert_file("/remote/data.bin", "0123456789");

        let dest = temp_dir.path().join("data.bin");
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000);
        let bytes = pull_file(&remote, &OsLocalFs::new(), &pull_entry(dest.clone()), Some(mtime))
            .expect("pull");

        assert_eq!(bytes, 10);
        assert_eq!(fs::read(&dest).expect("read"), b"0123456789");
        assert_eq!(fs::metadata(&dest).unwrap().modified().unwrap(), mtime);
    }

    #[test]
    fn test_failed_write_leaves_no_partial_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let remote = MemoryRemote::new();
        remote.insert_file("/remote/data.bin", "0123456789");

        let dest = temp_dir.path().join("data.bin");
        let local = FailingLocal { inner: OsLocalFs::new() };
        let err = pull_file(&remote, &local, &pull_entry(dest.clone()), None).unwrap_err();

        assert!(matches!(err, EngineError::Io { op: "write", .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn test_missing_remote_file_is_read_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dest = temp_dir.path().join("data.bin");
        let err = pull_file(&MemoryRemote::new(), &OsLocalFs::new(), &pull_entry(dest.clone()), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::Io { op: "read remote", .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn test_push_file_copies_into_remote() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("a.txt");
        fs::write(&src, b"hello").expect("write");

        let remote = MemoryRemote::new();
        remote.insert_dir("/dst");
        let entry = Entry {
            source_path: src,
            dest_path: PathBuf::from("/dst/a.txt"),
            is_dir: false,
            size: 5,
        };
        assert_eq!(push_file(&remote, &entry).expect("push"), 5);
        assert_eq!(remote.contents("/dst/a.txt"), Some(b"hello".to_vec()));

        // The remote refuses to clobber; the planner removes first
        assert!(push_file(&remote, &entry).is_err());
    }
}
