//! Hash-guarded mutation operations.
//!
//! Two operations mutate files: a patch-based edit (unified diff applied by the
//! fuzzy engine) and a whole-file write. Both verify the caller's expected hash
//! against disk before writing. Expected failures (state mismatch, invalid diff)
//! are returned as [`EditOutcome`] variants; only unexpected failures are `Err`.

use crate::failure_log::FailureLogger;
use crate::guard::{self, VerifyOutcome};
use crate::patch::{self, ApplyOptions, PatchError};
use crate::safety::SafetyError;
use crate::snapshot::{ContentHash, FileSnapshot};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Unexpected failures. These are not "fix your diff" situations and propagate
/// to the caller as errors.
#[derive(Error, Debug)]
pub enum EditError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8: {source}")]
    Utf8 {
        path: PathBuf,
        source: std::str::Utf8Error,
    },

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error("operation on {0} was aborted")]
    Aborted(PathBuf),
}

/// Cooperative cancellation flag, checked only at I/O boundaries.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn check_abort(signal: Option<&AbortSignal>, path: &Path) -> Result<(), EditError> {
    match signal {
        Some(signal) if signal.is_aborted() => Err(EditError::Aborted(path.to_path_buf())),
        _ => Ok(()),
    }
}

/// Apply a unified diff to a file whose content hash the caller knows.
#[derive(Debug, Clone)]
pub struct PatchRequest {
    pub path: PathBuf,
    pub diff: String,
    pub expected_hash: ContentHash,
    pub abort: Option<AbortSignal>,
}

impl PatchRequest {
    pub fn new(
        path: impl Into<PathBuf>,
        diff: impl Into<String>,
        expected_hash: ContentHash,
    ) -> Self {
        Self {
            path: path.into(),
            diff: diff.into(),
            expected_hash,
            abort: None,
        }
    }

    pub fn with_abort(mut self, signal: AbortSignal) -> Self {
        self.abort = Some(signal);
        self
    }
}

/// Replace a file's entire content. `expected_hash` may only be omitted when the
/// file does not exist yet.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub path: PathBuf,
    pub content: String,
    pub expected_hash: Option<ContentHash>,
    pub abort: Option<AbortSignal>,
}

impl WriteRequest {
    pub fn new(
        path: impl Into<PathBuf>,
        content: impl Into<String>,
        expected_hash: Option<ContentHash>,
    ) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            expected_hash,
            abort: None,
        }
    }

    pub fn with_abort(mut self, signal: AbortSignal) -> Self {
        self.abort = Some(signal);
        self
    }
}

/// Either mutating operation.
#[derive(Debug, Clone)]
pub enum EditRequest {
    Patch(PatchRequest),
    Write(WriteRequest),
}

impl EditRequest {
    pub fn path(&self) -> &Path {
        match self {
            EditRequest::Patch(req) => &req.path,
            EditRequest::Write(req) => &req.path,
        }
    }

    pub(crate) fn abort(&self) -> Option<&AbortSignal> {
        match self {
            EditRequest::Patch(req) => req.abort.as_ref(),
            EditRequest::Write(req) => req.abort.as_ref(),
        }
    }
}

impl From<PatchRequest> for EditRequest {
    fn from(req: PatchRequest) -> Self {
        EditRequest::Patch(req)
    }
}

impl From<WriteRequest> for EditRequest {
    fn from(req: WriteRequest) -> Self {
        EditRequest::Write(req)
    }
}

/// Result of a mutating operation that did not fail unexpectedly.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "EditOutcome should be checked for success/failure"]
pub enum EditOutcome {
    /// The file was written; `snapshot` is its new stamped state
    Success {
        message: String,
        snapshot: FileSnapshot,
    },
    /// Disk did not match the expected hash; nothing was written
    Mismatch { message: String },
    /// The diff does not fit the file; nothing was written
    InvalidDiff {
        message: String,
        line: Option<String>,
    },
}

impl EditOutcome {
    pub(crate) fn mismatch(path: &Path, expected: &ContentHash, actual: &ContentHash) -> Self {
        EditOutcome::Mismatch {
            message: format!(
                "State Mismatch: {} has changed since it was last read (expected hash {}, found {}). \
                 Re-read the file and retry.",
                path.display(),
                expected,
                actual
            ),
        }
    }

    pub(crate) fn unguarded_overwrite(path: &Path) -> Self {
        EditOutcome::Mismatch {
            message: format!(
                "State Mismatch: {} already exists; supply the content hash from your last read to overwrite it.",
                path.display()
            ),
        }
    }

    pub(crate) fn invalid_diff(error: &PatchError) -> Self {
        EditOutcome::InvalidDiff {
            message: error.to_string(),
            line: error.unmatched_line().map(str::to_string),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EditOutcome::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            EditOutcome::Success { message, .. }
            | EditOutcome::Mismatch { message }
            | EditOutcome::InvalidDiff { message, .. } => message,
        }
    }

    pub fn snapshot(&self) -> Option<&FileSnapshot> {
        match self {
            EditOutcome::Success { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }

    /// Flatten into the wire shape returned to the calling agent.
    pub fn into_tool_result(self) -> ToolResult {
        match self {
            EditOutcome::Success { message, snapshot } => ToolResult {
                success: true,
                message,
                latest_file_state: Some(snapshot),
            },
            EditOutcome::Mismatch { message } | EditOutcome::InvalidDiff { message, .. } => {
                ToolResult {
                    success: false,
                    message,
                    latest_file_state: None,
                }
            }
        }
    }
}

/// Machine-readable result for the agent-tooling layer.
///
/// Failure results omit `latest_file_state` entirely: the caller already holds
/// the unchanged content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_file_state: Option<FileSnapshot>,
}

/// What an edit would do, computed from a fresh read without writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEdit {
    pub path: PathBuf,
    pub original: String,
    pub updated: String,
    pub existed: bool,
}

#[derive(Debug)]
pub(crate) enum Plan {
    Ready(PlannedEdit),
    Rejected(EditOutcome),
}

/// Knobs for planning an edit.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PlanContext<'a> {
    pub options: ApplyOptions,
    pub max_diff_bytes: usize,
    /// Only set on the committing path, so previews never leave artifacts
    pub failure_log: Option<&'a FailureLogger>,
}

/// Verify preconditions and compute the new content for `request`.
pub(crate) fn plan(
    path: &Path,
    request: &EditRequest,
    ctx: &PlanContext<'_>,
) -> Result<Plan, EditError> {
    check_abort(request.abort(), path)?;
    match request {
        EditRequest::Patch(req) => plan_patch(path, req, ctx),
        EditRequest::Write(req) => plan_write(path, req),
    }
}

fn plan_patch(path: &Path, req: &PatchRequest, ctx: &PlanContext<'_>) -> Result<Plan, EditError> {
    let (original, existed) = match guard::verify(path, &req.expected_hash)? {
        VerifyOutcome::Match { content, existed } => (content, existed),
        VerifyOutcome::Mismatch { actual, .. } => {
            return Ok(Plan::Rejected(EditOutcome::mismatch(
                path,
                &req.expected_hash,
                &actual,
            )));
        }
    };

    if req.diff.len() > ctx.max_diff_bytes {
        let error = PatchError::TooLarge {
            size: req.diff.len(),
            limit: ctx.max_diff_bytes,
        };
        return Ok(Plan::Rejected(EditOutcome::invalid_diff(&error)));
    }

    match patch::apply_with(&original, &req.diff, &ctx.options) {
        Ok(updated) => Ok(Plan::Ready(PlannedEdit {
            path: path.to_path_buf(),
            original,
            updated,
            existed,
        })),
        Err(error) => {
            debug!(path = %path.display(), %error, "diff does not apply");
            if let Some(logger) = ctx.failure_log {
                logger.log_failure(&original, &req.diff);
            }
            Ok(Plan::Rejected(EditOutcome::invalid_diff(&error)))
        }
    }
}

fn plan_write(path: &Path, req: &WriteRequest) -> Result<Plan, EditError> {
    let (original, existed) = match &req.expected_hash {
        Some(expected) => match guard::verify(path, expected)? {
            VerifyOutcome::Match { content, existed } => (content, existed),
            VerifyOutcome::Mismatch { actual, .. } => {
                return Ok(Plan::Rejected(EditOutcome::mismatch(path, expected, &actual)));
            }
        },
        None => {
            let (content, existed) = guard::read_current(path)?;
            if existed {
                return Ok(Plan::Rejected(EditOutcome::unguarded_overwrite(path)));
            }
            (content, existed)
        }
    };

    Ok(Plan::Ready(PlannedEdit {
        path: path.to_path_buf(),
        original,
        updated: req.content.clone(),
        existed,
    }))
}

/// Write a planned edit to disk.
pub(crate) fn commit(planned: &PlannedEdit, abort: Option<&AbortSignal>) -> Result<(), EditError> {
    check_abort(abort, &planned.path)?;
    if planned.existed && planned.original == planned.updated {
        debug!(path = %planned.path.display(), "content unchanged; skipping write");
        return Ok(());
    }
    atomic_write(&planned.path, planned.updated.as_bytes())
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Missing parent directories are created. Either the full write lands or the
/// previous content stays in place.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    let io_err = |source: std::io::Error| EditError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(io_err)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    temp.write_all(content).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;

    // Keep the existing file's permissions across the rename
    if let Ok(metadata) = fs::metadata(path) {
        if let Err(e) = fs::set_permissions(temp.path(), metadata.permissions()) {
            warn!(path = %path.display(), "could not preserve permissions: {e}");
        }
    }

    temp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
