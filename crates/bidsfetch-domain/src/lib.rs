#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

//! Pure selection model for partial dataset mirrors: identifiers, naming
//! conventions, and the pattern sets handed to the synchronizer.

pub mod context;
pub mod ids;
pub mod layout;
pub mod selection;

pub use context::ObjectContext;
pub use ids::{RunId, SelectionError, SubjectId};
pub use layout::DatasetLayout;
pub use selection::{build_pattern_sets, Hierarchy, PatternSet, PatternShape};
