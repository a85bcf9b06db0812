use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Width of zero-padded identifiers in raw BIDS paths (`sub-01`, `run-01`).
pub const PADDED_WIDTH: usize = 2;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("identifier must not be empty")]
    Empty,
    #[error("`{0}` is not a positive integer")]
    NotANumber(String),
    #[error("identifiers start at 1 (got 0)")]
    Zero,
}

fn parse_positive(raw: &str) -> Result<NonZeroU32, SelectionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SelectionError::Empty);
    }
    let value: u32 = trimmed
        .parse()
        .map_err(|_| SelectionError::NotANumber(trimmed.to_string()))?;
    NonZeroU32::new(value).ok_or(SelectionError::Zero)
}

/// Participant number as it appears in `sub-<label>` entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(NonZeroU32);

impl SubjectId {
    pub const FIRST: Self = Self(NonZeroU32::MIN);

    #[must_use]
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Directory and filename prefix, e.g. `sub-01`.
    #[must_use]
    pub fn label(self) -> String {
        format!("sub-{:0width$}", self.get(), width = PADDED_WIDTH)
    }
}

impl FromStr for SubjectId {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_positive(s).map(Self)
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Functional run number. Raw filenames carry it zero padded, fMRIPrep
/// outputs carry the bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(NonZeroU32);

impl RunId {
    pub const FIRST: Self = Self(NonZeroU32::MIN);

    #[must_use]
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Token used by the raw hierarchy: `7` becomes `07`.
    #[must_use]
    pub fn padded(self) -> String {
        format!("{:0width$}", self.get(), width = PADDED_WIDTH)
    }

    /// Token used by the derivatives hierarchy: `7` stays `7`.
    #[must_use]
    pub fn unpadded(self) -> String {
        self.get().to_string()
    }
}

impl FromStr for RunId {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_positive(s).map(Self)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
