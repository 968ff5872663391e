//! Safe Patch: hash-guarded file edits for agent tooling
//!
//! An agent edits files through two operations: a fuzzy unified-diff patch and
//! a whole-file write. Both are guarded by the content hash the agent saw when
//! it last read the file, and every successful read or write hands back a
//! stamped [`FileSnapshot`] carrying a session-unique version number.
//!
//! # Architecture
//!
//! - [`patch`] parses diffs and places hunks tolerantly: trailing whitespace
//!   and blank-line disagreements are forgiven, non-blank content is not
//! - [`guard`] compares the expected hash with disk right before mutating
//! - [`confirm`] splits a change into a non-mutating preview and a later commit
//! - [`failure_log`] saves diffs that did not apply for offline inspection
//! - [`session`] owns the version counter and Always-Allow flags
//!
//! # Safety
//!
//! - Nothing is written unless the expected hash matches disk
//! - Atomic file writes (tempfile + fsync + rename)
//! - Optional workspace boundary enforcement
//! - UTF-8 validation
//!
//! # Example
//!
//! ```no_run
//! use safe_patch::{Decision, EditRequest, PatchRequest, SafePatchConfig, Session};
//!
//! let mut session = Session::new(SafePatchConfig::default())?;
//! let snapshot = session.read("src/main.rs")?;
//!
//! let diff = "@@ -1 +1 @@\n-fn main() {}\n+fn main() { println!(\"hi\"); }\n";
//! let request: EditRequest = PatchRequest::new("src/main.rs", diff, snapshot.content_hash).into();
//!
//! let outcome = match session.should_confirm(&request)? {
//!     Some(ticket) => session.commit(ticket, Decision::ProceedOnce)?,
//!     None => Some(session.execute(&request)?),
//! };
//! if let Some(outcome) = outcome {
//!     println!("{}", serde_json::to_string(&outcome.into_tool_result())?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod confirm;
pub mod edit;
pub mod failure_log;
pub mod guard;
pub mod patch;
pub mod safety;
pub mod session;
pub mod snapshot;

// Re-exports
pub use config::{load_from_path, load_from_str, ConfigError, SafePatchConfig};
pub use confirm::{
    AlwaysAllow, ConfirmError, ConfirmationGate, ConfirmationRequest, Decision, OperationCategory,
    PreviewPayload, PreviewTicket, Resolution,
};
pub use edit::{
    AbortSignal, EditError, EditOutcome, EditRequest, PatchRequest, PlannedEdit, ToolResult,
    WriteRequest,
};
pub use failure_log::{FailureArtifacts, FailureLogger};
pub use guard::VerifyOutcome;
pub use patch::{apply, ApplyOptions, PatchError};
pub use safety::{SafetyError, WorkspaceGuard};
pub use session::Session;
pub use snapshot::{ContentHash, FileSnapshot, VersionIssuer};
