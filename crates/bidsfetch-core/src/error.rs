use std::io;
use std::path::{Path, PathBuf};

/// Job-level failures. Any of these aborts the sync job that raised it;
/// per-object problems are recorded in the summary instead.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("cannot reach {root}: {reason}")]
    RemoteUnreachable { root: String, reason: String },
    #[error("{root} does not exist or holds no objects")]
    RootNotFound { root: String },
    #[error("local filesystem error at {}: {source}", path.display())]
    LocalFilesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid include pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

impl SyncError {
    pub(crate) fn unreachable(root: impl ToString, reason: impl Into<String>) -> Self {
        Self::RemoteUnreachable {
            root: root.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn local(path: &Path, source: io::Error) -> Self {
        Self::LocalFilesystem {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Stable identifier used in JSON output.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::RemoteUnreachable { .. } => "remote-unreachable",
            SyncError::RootNotFound { .. } => "root-not-found",
            SyncError::LocalFilesystem { .. } => "local-filesystem",
            SyncError::InvalidPattern { .. } => "invalid-pattern",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{var}={value} is not a usable remote root: {reason}")]
    InvalidRoot {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("{var}={value} is not a valid URL: {source}")]
    InvalidUrl {
        var: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{var}={value} must be a positive integer")]
    InvalidNumber { var: &'static str, value: String },
}
