use serde::{Deserialize, Serialize};

use crate::ids::{RunId, SubjectId};

/// Subject and run recovered from a BIDS-style object key.
///
/// Used to attach retry context to per-object failures; keys without
/// `sub-`/`run-` entities (dataset metadata) yield an empty context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectContext {
    pub subject: Option<SubjectId>,
    pub run: Option<RunId>,
}

impl ObjectContext {
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        let mut context = Self::default();
        for token in key.split(['/', '_', '.']) {
            if context.subject.is_none() {
                if let Some(value) = entity_value(token, "sub-") {
                    context.subject = value.parse().ok();
                }
            }
            if context.run.is_none() {
                if let Some(value) = entity_value(token, "run-") {
                    context.run = value.parse().ok();
                }
            }
        }
        context
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subject.is_none() && self.run.is_none()
    }
}

fn entity_value<'a>(token: &'a str, prefix: &str) -> Option<&'a str> {
    let value = token.strip_prefix(prefix)?;
    (!value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_padded_raw_keys() {
        let ctx = ObjectContext::from_key("sub-03/func/sub-03_task-flanker_run-02_bold.nii.gz");
        assert_eq!(ctx.subject, SubjectId::new(3));
        assert_eq!(ctx.run, RunId::new(2));
    }

    #[test]
    fn reads_unpadded_derivative_keys() {
        let ctx = ObjectContext::from_key(
            "sub-11/func/sub-11_task-flanker_run-1_desc-confounds_timeseries.tsv",
        );
        assert_eq!(ctx.subject, SubjectId::new(11));
        assert_eq!(ctx.run, RunId::new(1));
    }

    #[test]
    fn anatomical_keys_have_no_run() {
        let ctx = ObjectContext::from_key("sub-05/anat/sub-05_T1w.nii.gz");
        assert_eq!(ctx.subject, SubjectId::new(5));
        assert!(ctx.run.is_none());
    }

    #[test]
    fn metadata_keys_are_empty() {
        assert!(ObjectContext::from_key("participants.tsv").is_empty());
        assert!(ObjectContext::from_key("sub-xx/README").is_empty());
    }
}
