//! Namespace mapping between a source tree and its mirror.

use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// The (source root, destination root) pair for one mirroring operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRoot {
    source: PathBuf,
    dest: PathBuf,
}

impl TreeRoot {
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let source = source.into();
        let dest = dest.into();
        if source.as_os_str().is_empty() {
            return Err(EngineError::InvalidRoot {
                reason: "source root is empty".to_string(),
            });
        }
        if dest.as_os_str().is_empty() {
            return Err(EngineError::InvalidRoot {
                reason: "destination root is empty".to_string(),
            });
        }
        Ok(TreeRoot { source, dest })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Same pair with the roles swapped.
    pub fn reversed(&self) -> TreeRoot {
        TreeRoot {
            source: self.dest.clone(),
            dest: self.source.clone(),
        }
    }

    /// Map a path under the source root onto the destination root.
    ///
    /// Only the leading root components are replaced; a root name that shows
    /// up again deeper in the path is left alone.
    pub fn translate(&self, path: &Path) -> Result<PathBuf, EngineError> {
        let relative = path
            .strip_prefix(&self.source)
            .map_err(|_| EngineError::PathOutsideRoot {
                path: path.to_path_buf(),
                root: self.source.clone(),
            })?;
        if relative.as_os_str().is_empty() {
            Ok(self.dest.clone())
        } else {
            Ok(self.dest.join(relative))
        }
    }

    /// Recover the originating source path from a destination path.
    pub fn to_source(&self, dest_path: &Path) -> Result<PathBuf, EngineError> {
        self.reversed().translate(dest_path)
    }
}
