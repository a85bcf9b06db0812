//! Subject/run selection expressed as include patterns.
//!
//! The raw hierarchy and the fMRIPrep derivatives hierarchy name the same
//! acquisition differently: raw paths embed `run-01`, derivative paths embed
//! `run-1`, and only a handful of derivative outputs are wanted. Each
//! hierarchy therefore gets its own [`PatternSet`], built independently from
//! the same subject and run lists.
//!
//! Patterns are matched against the whole object key relative to the remote
//! root, with `*` spanning `/` (the `aws s3 sync --include` convention).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{RunId, SubjectId};
use crate::layout::{DatasetLayout, SUBJECT_SPACE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Hierarchy {
    Raw,
    Derivatives,
}

impl Hierarchy {
    /// Pattern counts contributed per stage for this hierarchy.
    #[must_use]
    pub fn shape(self, layout: &DatasetLayout) -> PatternShape {
        match self {
            Hierarchy::Raw => PatternShape {
                common: layout.raw_metadata.len(),
                per_subject: 1,
                per_run: 1,
            },
            Hierarchy::Derivatives => PatternShape {
                common: 1,
                per_subject: 1,
                per_run: DERIVATIVE_RUN_OUTPUTS,
            },
        }
    }
}

impl fmt::Display for Hierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hierarchy::Raw => "raw",
            Hierarchy::Derivatives => "derivatives",
        };
        f.write_str(name)
    }
}

/// Functional outputs fetched per subject and run from the derivatives tree:
/// boldref, brain mask, template-space BOLD, subject-space BOLD, confounds.
pub const DERIVATIVE_RUN_OUTPUTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternShape {
    pub common: usize,
    pub per_subject: usize,
    pub per_run: usize,
}

impl PatternShape {
    #[must_use]
    pub fn expected_len(&self, subjects: usize, runs: usize) -> usize {
        self.common + subjects * self.per_subject + subjects * runs * self.per_run
    }
}

/// Ordered include patterns scoped to one remote hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSet {
    hierarchy: Hierarchy,
    patterns: Vec<String>,
}

impl PatternSet {
    #[must_use]
    pub fn new(hierarchy: Hierarchy, patterns: Vec<String>) -> Self {
        Self {
            hierarchy,
            patterns,
        }
    }

    #[must_use]
    pub fn hierarchy(&self) -> Hierarchy {
        self.hierarchy
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.patterns
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(String::as_str)
    }
}

/// Builds the raw and derivative pattern sets for a selection.
///
/// Duplicated subjects or runs produce duplicated patterns; matching is
/// boolean so they are harmless. Values that do not exist remotely still yield
/// well-formed patterns that simply match nothing.
#[must_use]
pub fn build_pattern_sets(
    layout: &DatasetLayout,
    subjects: &[SubjectId],
    runs: &[RunId],
) -> (PatternSet, PatternSet) {
    (
        raw_patterns(layout, subjects, runs),
        derivative_patterns(layout, subjects, runs),
    )
}

fn raw_patterns(layout: &DatasetLayout, subjects: &[SubjectId], runs: &[RunId]) -> PatternSet {
    let common = layout.raw_metadata.iter().cloned();
    let anat = subjects
        .iter()
        .map(|subject| format!("{}/anat/*", subject.label()));
    let func = subjects.iter().flat_map(|subject| {
        runs.iter()
            .map(move |run| format!("{}/func/*run-{}*", subject.label(), run.padded()))
    });
    PatternSet::new(Hierarchy::Raw, common.chain(anat).chain(func).collect())
}

fn derivative_patterns(
    layout: &DatasetLayout,
    subjects: &[SubjectId],
    runs: &[RunId],
) -> PatternSet {
    let template = layout.template_entities();
    let common = std::iter::once("dataset_description.json".to_string());
    let anat = subjects.iter().map(|subject| {
        let sub = subject.label();
        format!("{sub}/anat/{sub}_{template}_desc-preproc_T1w.nii.gz")
    });
    let func = subjects.iter().flat_map(|subject| {
        let template = template.clone();
        runs.iter().flat_map(move |run| {
            let sub = subject.label();
            let stem = format!("{sub}/func/{sub}_task-{}_run-{}", layout.task, run.unpadded());
            [
                format!("{stem}_{template}_boldref.nii.gz"),
                format!("{stem}_{template}_desc-brain_mask.nii.gz"),
                format!("{stem}_{template}_desc-preproc_bold.nii.gz"),
                format!("{stem}_space-{SUBJECT_SPACE}_desc-preproc_bold.nii.gz"),
                format!("{stem}_desc-confounds_timeseries.tsv"),
            ]
        })
    });
    PatternSet::new(
        Hierarchy::Derivatives,
        common.chain(anat).chain(func).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subjects(values: &[u32]) -> Vec<SubjectId> {
        values.iter().filter_map(|v| SubjectId::new(*v)).collect()
    }

    fn runs(values: &[u32]) -> Vec<RunId> {
        values.iter().filter_map(|v| RunId::new(*v)).collect()
    }

    #[test]
    fn two_subjects_three_runs_yield_expected_counts() {
        let layout = DatasetLayout::default();
        let (raw, deriv) = build_pattern_sets(&layout, &subjects(&[1, 2]), &runs(&[1, 2, 3]));
        assert_eq!(raw.len(), 13);
        assert_eq!(deriv.len(), 33);
        assert_eq!(raw.hierarchy(), Hierarchy::Raw);
        assert_eq!(deriv.hierarchy(), Hierarchy::Derivatives);
    }

    #[test]
    fn cardinality_matches_shape_for_every_selection_size() {
        let layout = DatasetLayout::default();
        for n in 1..=4u32 {
            for m in 1..=4u32 {
                let subs: Vec<u32> = (1..=n).collect();
                let rs: Vec<u32> = (1..=m).collect();
                let (raw, deriv) = build_pattern_sets(&layout, &subjects(&subs), &runs(&rs));
                let (n, m) = (n as usize, m as usize);
                assert_eq!(raw.len(), Hierarchy::Raw.shape(&layout).expected_len(n, m));
                assert_eq!(
                    deriv.len(),
                    Hierarchy::Derivatives.shape(&layout).expected_len(n, m)
                );
            }
        }
    }

    #[test]
    fn duplicates_are_kept() {
        let layout = DatasetLayout::default();
        let (raw, deriv) = build_pattern_sets(&layout, &subjects(&[3, 3]), &runs(&[2, 2]));
        assert_eq!(raw.len(), 5 + 2 + 4);
        assert_eq!(deriv.len(), 1 + 2 + 20);
        assert_eq!(raw.as_slice()[5], raw.as_slice()[6]);
    }

    #[test]
    fn raw_runs_are_padded_and_derivative_runs_are_not() {
        let layout = DatasetLayout::default();
        let (raw, deriv) = build_pattern_sets(&layout, &subjects(&[4]), &runs(&[7]));

        let raw_func: Vec<&str> = raw.iter().filter(|p| p.contains("/func/")).collect();
        assert_eq!(raw_func, vec!["sub-04/func/*run-07*"]);

        let deriv_func: Vec<&str> = deriv.iter().filter(|p| p.contains("/func/")).collect();
        assert_eq!(deriv_func.len(), DERIVATIVE_RUN_OUTPUTS);
        for pattern in deriv_func {
            assert!(pattern.contains("_run-7_"), "unpadded run missing: {pattern}");
            assert!(!pattern.contains("run-07"), "padded run leaked: {pattern}");
        }
    }

    #[test]
    fn single_digit_run_still_produces_distinct_tokens() {
        let layout = DatasetLayout::default();
        let (raw, deriv) = build_pattern_sets(&layout, &subjects(&[1]), &runs(&[1]));
        let raw_func = raw.iter().find(|p| p.contains("/func/")).unwrap();
        let deriv_func = deriv.iter().find(|p| p.contains("/func/")).unwrap();
        assert!(raw_func.contains("run-01"));
        assert!(deriv_func.contains("run-1_"));
        assert_ne!(raw_func, deriv_func);
    }

    #[test]
    fn order_follows_stage_then_input_order() {
        let layout = DatasetLayout::default();
        let (raw, deriv) = build_pattern_sets(&layout, &subjects(&[2, 1]), &runs(&[3, 1]));
        assert_eq!(
            raw.as_slice(),
            &[
                "dataset_description.json",
                "participants.tsv",
                "participants.json",
                "README",
                "task-flanker_bold.json",
                "sub-02/anat/*",
                "sub-01/anat/*",
                "sub-02/func/*run-03*",
                "sub-02/func/*run-01*",
                "sub-01/func/*run-03*",
                "sub-01/func/*run-01*",
            ]
        );
        assert_eq!(deriv.as_slice()[0], "dataset_description.json");
        assert_eq!(
            deriv.as_slice()[1],
            "sub-02/anat/sub-02_space-MNI152NLin2009cAsym_res-2_desc-preproc_T1w.nii.gz"
        );
        assert_eq!(
            &deriv.as_slice()[3..8],
            &[
                "sub-02/func/sub-02_task-flanker_run-3_space-MNI152NLin2009cAsym_res-2_boldref.nii.gz",
                "sub-02/func/sub-02_task-flanker_run-3_space-MNI152NLin2009cAsym_res-2_desc-brain_mask.nii.gz",
                "sub-02/func/sub-02_task-flanker_run-3_space-MNI152NLin2009cAsym_res-2_desc-preproc_bold.nii.gz",
                "sub-02/func/sub-02_task-flanker_run-3_space-T1w_desc-preproc_bold.nii.gz",
                "sub-02/func/sub-02_task-flanker_run-3_desc-confounds_timeseries.tsv",
            ]
        );
    }

    #[test]
    fn identical_input_is_deterministic() {
        let layout = DatasetLayout::default();
        let first = build_pattern_sets(&layout, &subjects(&[5, 9]), &runs(&[2]));
        let second = build_pattern_sets(&layout, &subjects(&[5, 9]), &runs(&[2]));
        assert_eq!(first, second);
    }

    #[test]
    fn custom_layout_flows_into_patterns() {
        let layout = DatasetLayout {
            task: "stroop".into(),
            template_space: "MNI152NLin6Asym".into(),
            template_resolution: "1".into(),
            raw_metadata: vec!["dataset_description.json".into()],
        };
        let (raw, deriv) = build_pattern_sets(&layout, &subjects(&[1]), &runs(&[1]));
        assert_eq!(raw.len(), 1 + 1 + 1);
        assert!(deriv
            .iter()
            .any(|p| p.ends_with("task-stroop_run-1_space-MNI152NLin6Asym_res-1_boldref.nii.gz")));
    }
}
