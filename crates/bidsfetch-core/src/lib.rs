#![deny(clippy::all)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod config;
mod error;
mod fetch;
mod matcher;
mod outcome;
mod progress;
pub mod remote;
mod sync;

pub use crate::config::{
    Config, DatasetConfig, NetworkConfig, TransferConfig, DATASET_ID, DEFAULT_S3_ENDPOINT,
    DERIVATIVES_SUBDIR, ENV_DERIVATIVES_ROOT, ENV_DEST, ENV_DOWNLOADS, ENV_RAW_ROOT,
    ENV_S3_ENDPOINT,
};
pub use crate::error::{ConfigError, SyncError};
pub use crate::fetch::{config_error_outcome, fetch_dataset, plan_jobs, FetchRequest};
pub use crate::matcher::PatternMatcher;
pub use crate::outcome::{
    format_status_message, to_json_response, CommandStatus, ExecutionOutcome, COMMAND_NAME,
};
pub use crate::progress::ENV_PROGRESS;
pub use crate::sync::{sync, ObjectFailure, SyncJob, SyncOptions, SyncSummary};
