//! Read-only object stores the synchronizer mirrors from.
//!
//! Both stores expose the remote hierarchy as a flat list of keys relative to
//! the configured root. `s3://` roots are read anonymously over HTTPS; local
//! roots (`file://` or a plain path) stand in for a bucket in tests and
//! offline setups.

use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;

use anyhow::Result;
use url::Url;

use crate::config::NetworkConfig;
use crate::error::SyncError;

mod local;
mod s3;

pub use local::LocalStore;
pub use s3::S3Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRoot {
    S3 { bucket: String, prefix: String },
    Local(PathBuf),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RootParseError {
    #[error("remote root must not be empty")]
    Empty,
    #[error("s3 roots need a bucket name (s3://<bucket>/<prefix>)")]
    MissingBucket,
    #[error("`{0}` is not a local path")]
    InvalidFileUrl(String),
    #[error("unsupported scheme `{0}` (expected s3:// or file://)")]
    UnsupportedScheme(String),
}

impl FromStr for RemoteRoot {
    type Err = RootParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RootParseError::Empty);
        }
        if let Some(rest) = raw.strip_prefix("s3://") {
            let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
            if bucket.is_empty() {
                return Err(RootParseError::MissingBucket);
            }
            return Ok(RemoteRoot::S3 {
                bucket: bucket.to_string(),
                prefix: prefix.trim_matches('/').to_string(),
            });
        }
        if raw.starts_with("file://") {
            let path = Url::parse(raw)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(|| RootParseError::InvalidFileUrl(raw.to_string()))?;
            return Ok(RemoteRoot::Local(path));
        }
        if let Some((scheme, _)) = raw.split_once("://") {
            return Err(RootParseError::UnsupportedScheme(scheme.to_string()));
        }
        Ok(RemoteRoot::Local(PathBuf::from(raw)))
    }
}

impl fmt::Display for RemoteRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteRoot::S3 { bucket, prefix } if prefix.is_empty() => write!(f, "s3://{bucket}"),
            RemoteRoot::S3 { bucket, prefix } => write!(f, "s3://{bucket}/{prefix}"),
            RemoteRoot::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One object under a remote root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// `/`-separated key relative to the root.
    pub key: String,
    pub size: u64,
    pub last_modified: Option<SystemTime>,
}

pub trait ObjectStore: Send + Sync {
    fn root(&self) -> &RemoteRoot;

    /// Lists every object under the root.
    ///
    /// # Errors
    /// Fails when the root cannot be listed at all; such failures are fatal
    /// for the job.
    fn list(&self) -> Result<Vec<RemoteObject>, SyncError>;

    /// Opens a byte stream for one object.
    ///
    /// # Errors
    /// Fails when the object cannot be fetched; callers treat this as a
    /// per-object failure.
    fn open(&self, key: &str) -> Result<Box<dyn Read + Send>>;
}

/// Opens the store that serves `root`.
///
/// # Errors
/// Returns an error when the HTTP client cannot be prepared for an S3 root.
pub fn open_store(root: &RemoteRoot, network: &NetworkConfig) -> Result<Box<dyn ObjectStore>, SyncError> {
    match root {
        RemoteRoot::S3 { bucket, prefix } => Ok(Box::new(S3Store::new(
            network.s3_endpoint.clone(),
            bucket,
            prefix,
        )?)),
        RemoteRoot::Local(path) => Ok(Box::new(LocalStore::new(path.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_s3_roots() {
        let root: RemoteRoot = "s3://openneuro-derivatives/fmriprep/ds000102-fmriprep/"
            .parse()
            .unwrap();
        assert_eq!(
            root,
            RemoteRoot::S3 {
                bucket: "openneuro-derivatives".into(),
                prefix: "fmriprep/ds000102-fmriprep".into(),
            }
        );
        assert_eq!(
            root.to_string(),
            "s3://openneuro-derivatives/fmriprep/ds000102-fmriprep"
        );
    }

    #[test]
    fn bucket_without_prefix_is_allowed() {
        let root: RemoteRoot = "s3://openneuro.org".parse().unwrap();
        assert_eq!(
            root,
            RemoteRoot::S3 {
                bucket: "openneuro.org".into(),
                prefix: String::new(),
            }
        );
        assert_eq!(root.to_string(), "s3://openneuro.org");
    }

    #[test]
    fn parses_local_roots() {
        assert_eq!(
            "/srv/mirror".parse::<RemoteRoot>().unwrap(),
            RemoteRoot::Local(PathBuf::from("/srv/mirror"))
        );
        #[cfg(unix)]
        assert_eq!(
            "file:///srv/mirror".parse::<RemoteRoot>().unwrap(),
            RemoteRoot::Local(PathBuf::from("/srv/mirror"))
        );
    }

    #[test]
    fn rejects_malformed_roots() {
        assert_eq!("".parse::<RemoteRoot>(), Err(RootParseError::Empty));
        assert_eq!(
            "s3:///prefix".parse::<RemoteRoot>(),
            Err(RootParseError::MissingBucket)
        );
        assert_eq!(
            "gs://bucket/data".parse::<RemoteRoot>(),
            Err(RootParseError::UnsupportedScheme("gs".into()))
        );
    }
}
