//! Filtered one-way mirror of a remote hierarchy into a local directory.
//!
//! Everything under the remote root is excluded unless its key matches one of
//! the include patterns. Matching objects are copied to `local_root/<key>`;
//! local files are never deleted, so repeated runs only add or refresh files.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{mpsc, Mutex};
use std::thread;

use bidsfetch_domain::{Hierarchy, ObjectContext, PatternSet, RunId, SubjectId};
use filetime::FileTime;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::config::NetworkConfig;
use crate::error::SyncError;
use crate::matcher::PatternMatcher;
use crate::progress::ProgressReporter;
use crate::remote::{open_store, ObjectStore, RemoteObject, RemoteRoot};

const COPY_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// List and match only; nothing is written locally.
    pub dry_run: bool,
    pub parallel: usize,
    pub progress: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            parallel: 4,
            progress: false,
        }
    }
}

/// An object that could not be copied; the rest of the job carried on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectFailure {
    pub key: String,
    pub reason: String,
    pub subject: Option<SubjectId>,
    pub run: Option<RunId>,
}

impl ObjectFailure {
    fn new(key: &str, reason: impl Into<String>) -> Self {
        let context = ObjectContext::from_key(key);
        Self {
            key: key.to_string(),
            reason: reason.into(),
            subject: context.subject,
            run: context.run,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub hierarchy: Hierarchy,
    pub remote: String,
    pub local_root: PathBuf,
    pub listed: usize,
    pub matched: usize,
    pub copied: usize,
    pub skipped: usize,
    pub bytes_copied: u64,
    pub failures: Vec<ObjectFailure>,
    /// Patterns that selected no remote object.
    pub unmatched_patterns: Vec<String>,
    /// Keys a dry run would have copied.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub planned: Vec<String>,
}

impl SyncSummary {
    fn new(hierarchy: Hierarchy, remote: &RemoteRoot, local_root: &Path) -> Self {
        Self {
            hierarchy,
            remote: remote.to_string(),
            local_root: local_root.to_path_buf(),
            listed: 0,
            matched: 0,
            copied: 0,
            skipped: 0,
            bytes_copied: 0,
            failures: Vec::new(),
            unmatched_patterns: Vec::new(),
            planned: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One (remote root, local root, patterns) mirror. Jobs share nothing.
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub hierarchy: Hierarchy,
    pub remote: RemoteRoot,
    pub local_root: PathBuf,
    pub patterns: PatternSet,
}

impl SyncJob {
    /// Opens the job's store and mirrors it.
    ///
    /// # Errors
    /// Returns the job-level [`SyncError`] that stopped the mirror.
    pub fn run(&self, network: &NetworkConfig, options: SyncOptions) -> Result<SyncSummary, SyncError> {
        tracing::info!(
            hierarchy = %self.hierarchy,
            remote = %self.remote,
            local = %self.local_root.display(),
            patterns = self.patterns.len(),
            "starting sync job"
        );
        let store = open_store(&self.remote, network)?;
        let summary = sync(store.as_ref(), &self.local_root, &self.patterns, options)?;
        tracing::info!(
            hierarchy = %self.hierarchy,
            copied = summary.copied,
            skipped = summary.skipped,
            failed = summary.failures.len(),
            "sync job finished"
        );
        Ok(summary)
    }
}

enum TransferError {
    Object(String),
    Local(SyncError),
}

/// Mirrors every object of `store` matching `patterns` into `local_root`.
///
/// # Errors
/// Fails when the remote root cannot be listed, does not exist, a pattern is
/// not a valid glob, or the local filesystem rejects a write. Per-object
/// fetch problems are reported in [`SyncSummary::failures`] instead.
pub fn sync(
    store: &dyn ObjectStore,
    local_root: &Path,
    patterns: &PatternSet,
    options: SyncOptions,
) -> Result<SyncSummary, SyncError> {
    let matcher = PatternMatcher::compile(patterns)?;
    let mut summary = SyncSummary::new(patterns.hierarchy(), store.root(), local_root);

    let listing = ProgressReporter::spinner(format!("Listing {}", store.root()), options.progress);
    let objects = store.list()?;
    drop(listing);
    if objects.is_empty() {
        return Err(SyncError::RootNotFound {
            root: store.root().to_string(),
        });
    }
    summary.listed = objects.len();

    let mut hits = vec![false; matcher.patterns().len()];
    let mut pending = Vec::new();
    for object in objects {
        let indices = matcher.matching_indices(&object.key);
        if indices.is_empty() {
            tracing::trace!(key = %object.key, "excluded");
            continue;
        }
        for index in indices {
            hits[index] = true;
        }
        summary.matched += 1;

        let Some(dest) = destination_path(local_root, &object.key) else {
            tracing::warn!(key = %object.key, "refusing unsafe object key");
            summary
                .failures
                .push(ObjectFailure::new(&object.key, "unsafe object key"));
            continue;
        };
        if is_up_to_date(&object, &dest) {
            tracing::debug!(key = %object.key, "up to date");
            summary.skipped += 1;
            continue;
        }
        tracing::debug!(key = %object.key, size = object.size, "queued");
        pending.push((object, dest));
    }
    summary.unmatched_patterns = matcher
        .patterns()
        .iter()
        .zip(&hits)
        .filter(|(_, hit)| !**hit)
        .map(|(pattern, _)| pattern.clone())
        .collect();

    if options.dry_run {
        summary.planned = pending.into_iter().map(|(object, _)| object.key).collect();
        summary.planned.sort();
        return Ok(summary);
    }

    let fatal = transfer_all(store, pending, &options, &mut summary);
    summary.failures.sort_by(|a, b| a.key.cmp(&b.key));
    match fatal {
        Some(err) => Err(err),
        None => Ok(summary),
    }
}

/// Runs the queue on a scoped worker pool and folds results into `summary`.
/// Returns the first local filesystem error, after which no new transfers
/// start.
fn transfer_all(
    store: &dyn ObjectStore,
    pending: Vec<(RemoteObject, PathBuf)>,
    options: &SyncOptions,
    summary: &mut SyncSummary,
) -> Option<SyncError> {
    if pending.is_empty() {
        return None;
    }
    let progress = ProgressReporter::bar(
        format!("Copying {}", summary.hierarchy),
        pending.len(),
        options.progress,
    );
    let worker_count = options.parallel.clamp(1, pending.len());

    let (job_tx, job_rx) = mpsc::channel();
    for item in pending {
        if job_tx.send(item).is_err() {
            break;
        }
    }
    drop(job_tx);
    let job_rx = Mutex::new(job_rx);
    let abort = AtomicBool::new(false);
    let (result_tx, result_rx) = mpsc::channel();
    let mut fatal = None;

    thread::scope(|scope| {
        for _ in 0..worker_count {
            let result_tx = result_tx.clone();
            let job_rx = &job_rx;
            let abort = &abort;
            scope.spawn(move || loop {
                if abort.load(AtomicOrdering::Relaxed) {
                    break;
                }
                let next = match job_rx.lock() {
                    Ok(guard) => guard.recv(),
                    Err(_) => break,
                };
                let Ok((object, dest)) = next else {
                    break;
                };
                let result = transfer_one(store, &object, &dest);
                if matches!(result, Err(TransferError::Local(_))) {
                    abort.store(true, AtomicOrdering::Relaxed);
                }
                if result_tx.send((object, result)).is_err() {
                    break;
                }
            });
        }
        drop(result_tx);

        for (object, result) in result_rx {
            progress.increment();
            match result {
                Ok(bytes) => {
                    tracing::debug!(key = %object.key, bytes, "copied");
                    summary.copied += 1;
                    summary.bytes_copied += bytes;
                }
                Err(TransferError::Object(reason)) => {
                    tracing::warn!(key = %object.key, %reason, "object transfer failed");
                    summary.failures.push(ObjectFailure::new(&object.key, reason));
                }
                Err(TransferError::Local(err)) => {
                    tracing::error!(key = %object.key, error = %err, "aborting job");
                    if fatal.is_none() {
                        fatal = Some(err);
                    }
                }
            }
        }
    });

    progress.finish(format!(
        "{}: copied {} objects",
        summary.hierarchy, summary.copied
    ));
    fatal
}

fn transfer_one(
    store: &dyn ObjectStore,
    object: &RemoteObject,
    dest: &Path,
) -> Result<u64, TransferError> {
    let local = |path: &Path, err: io::Error| TransferError::Local(SyncError::local(path, err));
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| local(parent, err))?;

    let mut reader = store
        .open(&object.key)
        .map_err(|err| TransferError::Object(format!("{err:#}")))?;
    let mut tmp = NamedTempFile::new_in(parent).map_err(|err| local(parent, err))?;
    let mut buffer = vec![0u8; COPY_BUFFER];
    let mut written: u64 = 0;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransferError::Object(format!("stream error: {err}"))),
        };
        tmp.write_all(&buffer[..read])
            .map_err(|err| local(dest, err))?;
        written += read as u64;
    }
    if written != object.size {
        return Err(TransferError::Object(format!(
            "size mismatch (expected {} bytes, received {written})",
            object.size
        )));
    }

    tmp.persist(dest).map_err(|err| local(dest, err.error))?;
    if let Some(modified) = object.last_modified {
        filetime::set_file_mtime(dest, FileTime::from_system_time(modified))
            .map_err(|err| local(dest, err))?;
    }
    Ok(written)
}

/// Same size and a local mtime no older than the remote one, compared at
/// whole-second granularity.
fn is_up_to_date(object: &RemoteObject, dest: &Path) -> bool {
    let Ok(metadata) = fs::metadata(dest) else {
        return false;
    };
    if !metadata.is_file() || metadata.len() != object.size {
        return false;
    }
    let Some(remote) = object.last_modified else {
        return true;
    };
    let local = FileTime::from_last_modification_time(&metadata);
    local.unix_seconds() >= FileTime::from_system_time(remote).unix_seconds()
}

/// Maps a `/`-separated key below `root`, rejecting keys that would escape it.
fn destination_path(root: &Path, key: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return None;
        }
        path.push(segment);
    }
    Some(path)
}
