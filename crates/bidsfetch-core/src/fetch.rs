use std::collections::BTreeSet;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bidsfetch_domain::{build_pattern_sets, Hierarchy, RunId, SubjectId};
use serde_json::{json, Value};

use crate::config::{Config, DatasetConfig, DERIVATIVES_SUBDIR};
use crate::error::{ConfigError, SyncError};
use crate::outcome::{ExecutionOutcome, COMMAND_NAME};
use crate::sync::{SyncJob, SyncOptions, SyncSummary};

/// One invocation's selection. Empty lists fall back to the configured
/// default subject and run.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub subjects: Vec<SubjectId>,
    pub runs: Vec<RunId>,
    pub dest: Option<PathBuf>,
    pub dry_run: bool,
    pub progress: bool,
}

/// Builds the raw and derivatives jobs for a selection, in execution order.
#[must_use]
pub fn plan_jobs(
    dataset: &DatasetConfig,
    subjects: &[SubjectId],
    runs: &[RunId],
    dest: &Path,
) -> [SyncJob; 2] {
    let (raw, derivatives) = build_pattern_sets(&dataset.layout, subjects, runs);
    [
        SyncJob {
            hierarchy: Hierarchy::Raw,
            remote: dataset.raw_root.clone(),
            local_root: dest.to_path_buf(),
            patterns: raw,
        },
        SyncJob {
            hierarchy: Hierarchy::Derivatives,
            remote: dataset.derivatives_root.clone(),
            local_root: dest.join(DERIVATIVES_SUBDIR),
            patterns: derivatives,
        },
    ]
}

/// Mirrors the selected subjects and runs from both hierarchies.
///
/// Both jobs always run. The outcome is a failure when either job stopped on
/// a job-level error or any object could not be copied.
///
/// # Errors
/// Only fails when a job summary cannot be encoded.
pub fn fetch_dataset(config: &Config, request: &FetchRequest) -> Result<ExecutionOutcome> {
    let dataset = config.dataset();
    let subjects = or_default(&request.subjects, dataset.default_subject);
    let runs = or_default(&request.runs, dataset.default_run);
    let dest = request.dest.clone().unwrap_or_else(|| dataset.dest.clone());
    let options = SyncOptions {
        dry_run: request.dry_run,
        parallel: config.transfer().parallel,
        progress: request.progress,
    };

    tracing::info!(
        dataset = %dataset.id,
        subjects = %join_ids(&subjects),
        runs = %join_ids(&runs),
        dest = %dest.display(),
        dry_run = request.dry_run,
        "fetching selection"
    );

    let mut reports = Vec::new();
    let mut totals = Totals::default();
    for job in plan_jobs(dataset, &subjects, &runs, &dest) {
        let result = job.run(config.network(), options);
        reports.push(job_report(&job, &result)?);
        totals.record(result);
    }

    let retry = totals.retry_hint(&subjects, &runs);
    let mut details = json!({
        "dataset": dataset.id,
        "subjects": subjects,
        "runs": runs,
        "dest": dest.display().to_string(),
        "dry_run": request.dry_run,
        "jobs": reports,
    });
    if let Some(retry) = &retry {
        details["retry"] = Value::String(retry.clone());
    }

    if totals.is_clean() {
        let message = if request.dry_run {
            format!(
                "dry run: {} objects would be copied ({} up to date)",
                totals.planned, totals.skipped
            )
        } else {
            format!(
                "fetched {}: {} copied, {} up to date",
                dataset.id, totals.copied, totals.skipped
            )
        };
        return Ok(ExecutionOutcome::success(message, details));
    }

    let mut problems = Vec::new();
    if totals.fatal > 0 {
        problems.push(plural(totals.fatal, "job", "jobs") + " failed");
    }
    if totals.failed_objects > 0 {
        problems.push(plural(totals.failed_objects, "object", "objects") + " could not be copied");
    }
    Ok(ExecutionOutcome::failure(
        format!("fetch of {} incomplete: {}", dataset.id, problems.join(", ")),
        details,
    ))
}

/// Converts an unusable environment override into a user-facing outcome.
#[must_use]
pub fn config_error_outcome(err: &ConfigError) -> ExecutionOutcome {
    ExecutionOutcome::user_error(
        err.to_string(),
        json!({
            "reason": "invalid-config",
            "hint": "unset the variable to use the built-in dataset locations",
        }),
    )
}

fn or_default<T: Copy>(values: &[T], fallback: T) -> Vec<T> {
    if values.is_empty() {
        vec![fallback]
    } else {
        values.to_vec()
    }
}

fn job_report(job: &SyncJob, result: &Result<SyncSummary, SyncError>) -> Result<Value> {
    match result {
        Ok(summary) => {
            let mut report = serde_json::to_value(summary)
                .with_context(|| format!("failed to encode {} summary", job.hierarchy))?;
            report["status"] = json!(if summary.is_clean() { "ok" } else { "partial" });
            report["patterns"] = json!(job.patterns.len());
            Ok(report)
        }
        Err(err) => Ok(json!({
            "hierarchy": job.hierarchy,
            "remote": job.remote.to_string(),
            "local_root": job.local_root.display().to_string(),
            "status": "error",
            "patterns": job.patterns.len(),
            "error": {
                "kind": err.kind(),
                "message": err.to_string(),
            },
        })),
    }
}

#[derive(Default)]
struct Totals {
    copied: usize,
    skipped: usize,
    planned: usize,
    fatal: usize,
    failed_objects: usize,
    failed_subjects: BTreeSet<SubjectId>,
    failed_runs: BTreeSet<RunId>,
    unscoped_failure: bool,
}

impl Totals {
    fn record(&mut self, result: Result<SyncSummary, SyncError>) {
        match result {
            Ok(summary) => {
                self.copied += summary.copied;
                self.skipped += summary.skipped;
                self.planned += summary.planned.len();
                self.failed_objects += summary.failures.len();
                for failure in summary.failures {
                    match failure.subject {
                        Some(subject) => {
                            self.failed_subjects.insert(subject);
                        }
                        None => self.unscoped_failure = true,
                    }
                    if let Some(run) = failure.run {
                        self.failed_runs.insert(run);
                    }
                }
            }
            Err(_) => {
                self.fatal += 1;
                self.unscoped_failure = true;
            }
        }
    }

    fn is_clean(&self) -> bool {
        self.fatal == 0 && self.failed_objects == 0
    }

    /// Narrowest re-invocation covering everything that failed.
    fn retry_hint(&self, subjects: &[SubjectId], runs: &[RunId]) -> Option<String> {
        if self.is_clean() {
            return None;
        }
        let subjects = if self.unscoped_failure {
            join_ids(subjects)
        } else {
            join_ids(&self.failed_subjects.iter().copied().collect::<Vec<_>>())
        };
        let runs = if self.unscoped_failure || self.failed_runs.is_empty() {
            join_ids(runs)
        } else {
            join_ids(&self.failed_runs.iter().copied().collect::<Vec<_>>())
        };
        Some(format!("{COMMAND_NAME} --subjects {subjects} --runs {runs}"))
    }
}

fn join_ids<T: Display>(ids: &[T]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn plural(count: usize, one: &str, many: &str) -> String {
    if count == 1 {
        format!("{count} {one}")
    } else {
        format!("{count} {many}")
    }
}
