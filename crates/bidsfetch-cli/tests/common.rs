#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use assert_cmd::{assert::Assert, cargo::cargo_bin_cmd, Command};
use serde_json::Value;
use tempfile::TempDir;

/// Raw and derivative trees standing in for the two S3 roots, plus an empty
/// workspace for the local mirror.
pub struct Fixture {
    pub temp: TempDir,
    pub raw: PathBuf,
    pub derivatives: PathBuf,
    pub dest: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = tempfile::Builder::new()
            .prefix("bidsfetch-cli")
            .tempdir()
            .expect("tempdir");
        let raw = temp.path().join("openneuro.org/ds000102");
        let derivatives = temp
            .path()
            .join("openneuro-derivatives/fmriprep/ds000102-fmriprep");
        let dest = temp.path().join("mirror/ds000102");

        for key in [
            "dataset_description.json",
            "participants.tsv",
            "participants.json",
            "README",
            "CHANGES",
            "task-flanker_bold.json",
        ] {
            write(&raw, key);
        }
        for subject in 1..=3u32 {
            let sub = format!("sub-{subject:02}");
            write(&raw, &format!("{sub}/anat/{sub}_T1w.nii.gz"));
            for run in 1..=2u32 {
                write(
                    &raw,
                    &format!("{sub}/func/{sub}_task-flanker_run-{run:02}_bold.nii.gz"),
                );
                write(
                    &raw,
                    &format!("{sub}/func/{sub}_task-flanker_run-{run:02}_events.tsv"),
                );
            }

            write(&derivatives, &format!("{sub}.html"));
            write(
                &derivatives,
                &format!("{sub}/anat/{sub}_space-MNI152NLin2009cAsym_res-2_desc-preproc_T1w.nii.gz"),
            );
            write(&derivatives, &format!("{sub}/anat/{sub}_desc-preproc_T1w.nii.gz"));
            for run in 1..=2u32 {
                let stem = format!("{sub}/func/{sub}_task-flanker_run-{run}");
                for suffix in [
                    "space-MNI152NLin2009cAsym_res-2_boldref.nii.gz",
                    "space-MNI152NLin2009cAsym_res-2_desc-brain_mask.nii.gz",
                    "space-MNI152NLin2009cAsym_res-2_desc-preproc_bold.nii.gz",
                    "space-T1w_desc-preproc_bold.nii.gz",
                    "desc-confounds_timeseries.tsv",
                    "desc-confounds_timeseries.json",
                ] {
                    write(&derivatives, &format!("{stem}_{suffix}"));
                }
            }
        }
        write(&derivatives, "dataset_description.json");

        Self {
            temp,
            raw,
            derivatives,
            dest,
        }
    }

    /// `bidsfetch` pointed at the fixture roots with progress and color off.
    pub fn command(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("bidsfetch");
        cmd.env("BIDSFETCH_RAW_ROOT", &self.raw)
            .env("BIDSFETCH_DERIVATIVES_ROOT", &self.derivatives)
            .env("BIDSFETCH_DEST", &self.dest)
            .env("BIDSFETCH_PROGRESS", "0")
            .env("BIDSFETCH_DOWNLOADS", "2")
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .current_dir(self.temp.path());
        cmd
    }

    pub fn raw_file(&self, key: &str) -> PathBuf {
        self.dest.join(key)
    }

    pub fn derivative_file(&self, key: &str) -> PathBuf {
        self.dest.join("derivatives/fmriprep").join(key)
    }
}

pub fn write(root: &Path, key: &str) {
    let path = root.join(key);
    fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
    fs::write(&path, format!("contents of {key}\n")).expect("write fixture file");
}

pub fn files_under(root: &Path) -> Vec<String> {
    let mut files = Vec::new();
    collect(root, root, &mut files);
    files.sort();
    files
}

fn collect(root: &Path, dir: &Path, files: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect(root, &path, files);
        } else if let Ok(relative) = path.strip_prefix(root) {
            files.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}

pub fn stdout(assert: &Assert) -> String {
    String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 stdout")
}

pub fn stderr(assert: &Assert) -> String {
    String::from_utf8(assert.get_output().stderr.clone()).expect("utf8 stderr")
}
