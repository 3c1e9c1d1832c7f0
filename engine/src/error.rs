//! Error types for the mirroring engine.
//!
//! `EngineError` represents failures that stop a mirroring operation (or, when
//! the per-file policy allows it, failures recorded against a single entry in
//! the manifest). Enumeration problems are never errors; they are collected as
//! warnings on the manifest instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while mirroring a tree or running a remote operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The remote endpoint cannot be reached or is not usable
    #[error("cannot connect to remote endpoint {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    /// Destination exists with a type incompatible with the source
    #[error("destination conflict at {}: {reason}", path.display())]
    Conflict { path: PathBuf, reason: &'static str },

    /// Source root does not exist
    #[error("source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// A stat/read/write/mkdir/remove call failed on either side
    #[error("{op} failed for {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A tree root is unusable (empty, or otherwise malformed)
    #[error("invalid tree root: {reason}")]
    InvalidRoot { reason: String },

    /// A path handed to the translator does not live under the expected root
    #[error("path {} is not under root {}", path.display(), root.display())]
    PathOutsideRoot { path: PathBuf, root: PathBuf },

    /// A file was moved but the destination does not match the source
    #[error("transfer failed for {}: {reason}", path.display())]
    TransferFailed { path: PathBuf, reason: String },
}

impl EngineError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        EngineError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// True when the error means the remote side was never reachable.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_message_names_operation_and_path() {
        let err = EngineError::io(
            "mkdir",
            "/backup/set1",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("mkdir"));
        assert!(msg.contains("/backup/set1"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_raw_os_error_only_for_io() {
        let err = EngineError::io("stat", "/x", io::Error::from_raw_os_error(2));
        assert_eq!(err.raw_os_error(), Some(2));

        let conflict = EngineError::Conflict {
            path: PathBuf::from("/x"),
            reason: "exists and is not a directory",
        };
        assert_eq!(conflict.raw_os_error(), None);
        assert!(!conflict.is_connection());
    }
}
