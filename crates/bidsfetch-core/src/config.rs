//! Immutable configuration assembled once per invocation.
//!
//! Defaults describe the OpenNeuro `ds000102` flanker dataset and its
//! fMRIPrep derivatives. Every remote location can be overridden through the
//! environment, which is how tests point both jobs at local mock stores.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::thread;

use bidsfetch_domain::{DatasetLayout, RunId, SubjectId};
use url::Url;

use crate::error::ConfigError;
use crate::remote::RemoteRoot;

pub const DATASET_ID: &str = "ds000102";
pub const RAW_BUCKET: &str = "openneuro.org";
pub const DERIVATIVES_BUCKET: &str = "openneuro-derivatives";
pub const DEFAULT_S3_ENDPOINT: &str = "https://s3.amazonaws.com";
/// Location of the derivatives mirror inside the local dataset root.
pub const DERIVATIVES_SUBDIR: &str = "derivatives/fmriprep";
const MAX_TRANSFER_WORKERS: usize = 16;

pub const ENV_RAW_ROOT: &str = "BIDSFETCH_RAW_ROOT";
pub const ENV_DERIVATIVES_ROOT: &str = "BIDSFETCH_DERIVATIVES_ROOT";
pub const ENV_S3_ENDPOINT: &str = "BIDSFETCH_S3_ENDPOINT";
pub const ENV_DEST: &str = "BIDSFETCH_DEST";
pub const ENV_DOWNLOADS: &str = "BIDSFETCH_DOWNLOADS";

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    /// Returns the trimmed value, treating empty strings as unset.
    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) dataset: DatasetConfig,
    pub(crate) network: NetworkConfig,
    pub(crate) transfer: TransferConfig,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    ///
    /// # Errors
    /// Returns an error if an override names an unusable root, endpoint or
    /// worker count.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Result<Self, ConfigError> {
        let raw_root = root_from(
            snapshot,
            ENV_RAW_ROOT,
            format!("s3://{RAW_BUCKET}/{DATASET_ID}"),
        )?;
        let derivatives_root = root_from(
            snapshot,
            ENV_DERIVATIVES_ROOT,
            format!("s3://{DERIVATIVES_BUCKET}/fmriprep/{DATASET_ID}-fmriprep"),
        )?;
        let endpoint_raw = snapshot.var(ENV_S3_ENDPOINT).unwrap_or(DEFAULT_S3_ENDPOINT);
        let s3_endpoint = Url::parse(endpoint_raw).map_err(|source| ConfigError::InvalidUrl {
            var: ENV_S3_ENDPOINT,
            value: endpoint_raw.to_string(),
            source,
        })?;
        let dest = snapshot
            .var(ENV_DEST)
            .map_or_else(|| PathBuf::from("data").join(DATASET_ID), PathBuf::from);
        let parallel = match snapshot.var(ENV_DOWNLOADS) {
            Some(value) => value
                .parse::<usize>()
                .ok()
                .filter(|workers| *workers > 0)
                .ok_or_else(|| ConfigError::InvalidNumber {
                    var: ENV_DOWNLOADS,
                    value: value.to_string(),
                })?,
            None => available_workers(),
        };

        Ok(Self {
            dataset: DatasetConfig {
                id: DATASET_ID.to_string(),
                raw_root,
                derivatives_root,
                layout: DatasetLayout::default(),
                default_subject: SubjectId::FIRST,
                default_run: RunId::FIRST,
                dest,
            },
            network: NetworkConfig { s3_endpoint },
            transfer: TransferConfig {
                parallel: parallel.min(MAX_TRANSFER_WORKERS),
            },
        })
    }

    #[must_use]
    pub fn dataset(&self) -> &DatasetConfig {
        &self.dataset
    }

    #[must_use]
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    #[must_use]
    pub fn transfer(&self) -> &TransferConfig {
        &self.transfer
    }
}

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub id: String,
    pub raw_root: RemoteRoot,
    pub derivatives_root: RemoteRoot,
    pub layout: DatasetLayout,
    pub default_subject: SubjectId,
    pub default_run: RunId,
    /// Local dataset root; derivatives land in [`DERIVATIVES_SUBDIR`] below it.
    pub dest: PathBuf,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub s3_endpoint: Url,
}

#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    pub parallel: usize,
}

fn root_from(
    snapshot: &EnvSnapshot,
    var: &'static str,
    default: String,
) -> Result<RemoteRoot, ConfigError> {
    let value = snapshot.var(var).map_or(default, ToOwned::to_owned);
    value.parse().map_err(|err: crate::remote::RootParseError| ConfigError::InvalidRoot {
        var,
        reason: err.to_string(),
        value,
    })
}

fn available_workers() -> usize {
    thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
        .clamp(1, MAX_TRANSFER_WORKERS)
}
