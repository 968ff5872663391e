//! Fuzzy unified-diff application.
//!
//! - [`parser`] turns diff text into ordered hunks
//! - [`matcher`] locates a hunk's context/removed lines in the current text
//! - [`applicator`] drives the matcher hunk by hunk and splices in replacements

pub mod applicator;
pub mod errors;
pub mod matcher;
pub mod parser;

pub use applicator::{
    apply, apply_parsed, apply_with, ApplyOptions, PatchOutcome, Placement, DEFAULT_SEARCH_WINDOW,
};
pub use errors::{ClosestLine, PatchError};
pub use matcher::{diagnose, find, find_in_range, Divergence, MatchSpan};
pub use parser::{parse, Hunk, HunkLine, ParsedDiff};
