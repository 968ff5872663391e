use thiserror::Error;

/// Closest line in the target to a hunk line that could not be located.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosestLine {
    /// 1-indexed line number in the file as mutated by earlier hunks
    pub line_number: usize,
    pub text: String,
    pub similarity: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    #[error(
        "Invalid diff: hunk {hunk} ({header}) does not match the file; could not locate line {unmatched_line:?}{hint}",
        hint = closest_hint(.closest)
    )]
    HunkNotFound {
        /// 1-indexed position of the hunk within the diff
        hunk: usize,
        header: String,
        unmatched_line: String,
        closest: Option<ClosestLine>,
    },

    #[error("Invalid diff: malformed hunk header {header:?}")]
    MalformedHeader { header: String },

    #[error("Invalid diff: diff touches more than one file ({first} and {second})")]
    MultipleFiles { first: String, second: String },

    #[error("Invalid diff: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
}

impl PatchError {
    /// The source line that could not be located, when the failure is a context mismatch.
    pub fn unmatched_line(&self) -> Option<&str> {
        match self {
            PatchError::HunkNotFound { unmatched_line, .. } => Some(unmatched_line),
            _ => None,
        }
    }
}

fn closest_hint(closest: &Option<ClosestLine>) -> String {
    match closest {
        Some(c) => format!(" (closest: line {} {:?})", c.line_number, c.text),
        None => String::new(),
    }
}
