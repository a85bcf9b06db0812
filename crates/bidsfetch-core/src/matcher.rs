use bidsfetch_domain::PatternSet;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::SyncError;

/// Compiled include filter: a key is selected when any pattern matches the
/// whole key. `*` crosses `/`, mirroring `aws s3 sync --include`.
pub struct PatternMatcher {
    set: GlobSet,
    patterns: Vec<String>,
}

impl PatternMatcher {
    /// Compiles every pattern of the set.
    ///
    /// # Errors
    /// Returns [`SyncError::InvalidPattern`] for the first pattern that is
    /// not a valid glob.
    pub fn compile(patterns: &PatternSet) -> Result<Self, SyncError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns.iter() {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(false)
                .build()
                .map_err(|source| SyncError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| SyncError::InvalidPattern {
            pattern: patterns.as_slice().join(", "),
            source,
        })?;
        Ok(Self {
            set,
            patterns: patterns.as_slice().to_vec(),
        })
    }

    #[must_use]
    pub fn is_match(&self, key: &str) -> bool {
        self.set.is_match(key)
    }

    /// Indices (into [`Self::patterns`]) of every pattern matching `key`.
    #[must_use]
    pub fn matching_indices(&self, key: &str) -> Vec<usize> {
        self.set.matches(key)
    }

    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
