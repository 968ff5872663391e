use crate::patch::{ApplyOptions, DEFAULT_SEARCH_WINDOW};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_MAX_DIFF_BYTES: usize = 1024 * 1024;

/// Engine configuration. Every section is optional.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SafePatchConfig {
    #[serde(default)]
    pub patch: PatchSection,
    #[serde(default)]
    pub confirm: ConfirmSection,
    #[serde(default)]
    pub failure_log: FailureLogSection,
    #[serde(default)]
    pub workspace: WorkspaceSection,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PatchSection {
    /// Lines searched on either side of a hunk's hinted position
    #[serde(default = "default_search_window")]
    pub search_window: usize,
    #[serde(default = "default_max_diff_bytes")]
    pub max_diff_bytes: usize,
}

impl Default for PatchSection {
    fn default() -> Self {
        Self {
            search_window: default_search_window(),
            max_diff_bytes: default_max_diff_bytes(),
        }
    }
}

fn default_search_window() -> usize {
    DEFAULT_SEARCH_WINDOW
}

fn default_max_diff_bytes() -> usize {
    DEFAULT_MAX_DIFF_BYTES
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfirmSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ConfirmSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FailureLogSection {
    /// Where failed diffs are saved; unset disables the log
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceSection {
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Sub-paths of `root` that may never be edited
    #[serde(default = "default_forbidden")]
    pub forbidden: Vec<PathBuf>,
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            root: None,
            forbidden: default_forbidden(),
        }
    }
}

fn default_forbidden() -> Vec<PathBuf> {
    vec![PathBuf::from(".git")]
}

impl SafePatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patch.max_diff_bytes == 0 {
            issues.push(ValidationIssue::OutOfRange {
                field: "patch.max_diff_bytes",
                message: "must be greater than zero".to_string(),
            });
        }

        if let Some(dir) = &self.failure_log.dir {
            if dir.as_os_str().is_empty() {
                issues.push(ValidationIssue::EmptyPath {
                    field: "failure_log.dir",
                });
            }
        }

        if let Some(root) = &self.workspace.root {
            if root.as_os_str().is_empty() {
                issues.push(ValidationIssue::EmptyPath {
                    field: "workspace.root",
                });
            }
        }

        for entry in &self.workspace.forbidden {
            if entry.as_os_str().is_empty() {
                issues.push(ValidationIssue::EmptyPath {
                    field: "workspace.forbidden",
                });
            } else if entry.is_absolute() {
                issues.push(ValidationIssue::AbsoluteForbidden {
                    path: entry.clone(),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            search_window: self.patch.search_window,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    OutOfRange {
        field: &'static str,
        message: String,
    },
    EmptyPath {
        field: &'static str,
    },
    AbsoluteForbidden {
        path: PathBuf,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::OutOfRange { field, message } => write!(f, "'{field}' {message}"),
            ValidationIssue::EmptyPath { field } => write!(f, "'{field}' contains an empty path"),
            ValidationIssue::AbsoluteForbidden { path } => write!(
                f,
                "forbidden path '{}' must be relative to the workspace root",
                path.display()
            ),
        }
    }
}
