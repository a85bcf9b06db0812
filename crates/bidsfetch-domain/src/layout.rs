use serde::{Deserialize, Serialize};

pub const DEFAULT_TASK: &str = "flanker";
pub const DEFAULT_TEMPLATE_SPACE: &str = "MNI152NLin2009cAsym";
pub const DEFAULT_TEMPLATE_RESOLUTION: &str = "2";
/// Native anatomical space used by fMRIPrep for subject-space BOLD outputs.
pub const SUBJECT_SPACE: &str = "T1w";

/// Naming conventions shared by the raw and derivative hierarchies of one
/// dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetLayout {
    pub task: String,
    pub template_space: String,
    pub template_resolution: String,
    /// Dataset-level files mirrored from the raw root regardless of selection.
    pub raw_metadata: Vec<String>,
}

impl DatasetLayout {
    /// `space-<template>_res-<n>` entity pair used by normalized outputs.
    #[must_use]
    pub fn template_entities(&self) -> String {
        format!(
            "space-{}_res-{}",
            self.template_space, self.template_resolution
        )
    }
}

impl Default for DatasetLayout {
    fn default() -> Self {
        Self {
            task: DEFAULT_TASK.to_string(),
            template_space: DEFAULT_TEMPLATE_SPACE.to_string(),
            template_resolution: DEFAULT_TEMPLATE_RESOLUTION.to_string(),
            raw_metadata: vec![
                "dataset_description.json".to_string(),
                "participants.tsv".to_string(),
                "participants.json".to_string(),
                "README".to_string(),
                format!("task-{DEFAULT_TASK}_bold.json"),
            ],
        }
    }
}
