//! Session lifecycle object.
//!
//! A [`Session`] owns everything that lives exactly as long as one agent
//! session: the version counter, the confirmation gate with its Always-Allow
//! flags, and the resolved configuration. Dropping the session discards all of
//! it; a new session starts versions over at 1.

use crate::config::SafePatchConfig;
use crate::confirm::{
    ConfirmError, ConfirmationGate, ConfirmationRequest, Decision, PreviewPayload, PreviewTicket,
    Resolution,
};
use crate::edit::{
    self, EditError, EditOutcome, EditRequest, PatchRequest, Plan, PlanContext, WriteRequest,
};
use crate::failure_log::FailureLogger;
use crate::guard::{self, VerifyOutcome};
use crate::safety::{SafetyError, WorkspaceGuard};
use crate::snapshot::{ContentHash, FileSnapshot, VersionIssuer};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Session {
    versions: VersionIssuer,
    gate: ConfirmationGate,
    config: SafePatchConfig,
    workspace: Option<WorkspaceGuard>,
    failure_log: FailureLogger,
}

impl Default for Session {
    fn default() -> Self {
        let config = SafePatchConfig::default();
        Self {
            versions: VersionIssuer::new(),
            gate: ConfirmationGate::new(config.confirm.enabled),
            failure_log: FailureLogger::new(config.failure_log.dir.clone()),
            workspace: None,
            config,
        }
    }
}

impl Session {
    /// Start a session. Fails only if a configured workspace root cannot be resolved.
    pub fn new(config: SafePatchConfig) -> Result<Self, SafetyError> {
        let workspace = match &config.workspace.root {
            Some(root) => Some(WorkspaceGuard::new(root, &config.workspace.forbidden)?),
            None => None,
        };

        Ok(Self {
            versions: VersionIssuer::new(),
            gate: ConfirmationGate::new(config.confirm.enabled),
            failure_log: FailureLogger::new(config.failure_log.dir.clone()),
            workspace,
            config,
        })
    }

    pub fn config(&self) -> &SafePatchConfig {
        &self.config
    }

    pub fn versions(&self) -> &VersionIssuer {
        &self.versions
    }

    pub fn gate(&self) -> &ConfirmationGate {
        &self.gate
    }

    pub fn workspace(&self) -> Option<&WorkspaceGuard> {
        self.workspace.as_ref()
    }

    /// Read a file and stamp it with the next version.
    pub fn read(&mut self, path: impl AsRef<Path>) -> Result<FileSnapshot, EditError> {
        let path = self.resolve_path(path.as_ref())?;
        let snapshot = self.versions.read_and_stamp(&path)?;
        debug!(path = %path.display(), version = snapshot.version, "read");
        Ok(snapshot)
    }

    /// Stamp content the caller already holds. Consumes one version.
    pub fn stamp(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> FileSnapshot {
        self.versions.stamp(path, content)
    }

    /// Check `expected` against disk without mutating anything.
    pub fn verify(
        &self,
        path: impl AsRef<Path>,
        expected: &ContentHash,
    ) -> Result<VerifyOutcome, EditError> {
        let path = self.resolve_path(path.as_ref())?;
        guard::verify(&path, expected)
    }

    /// Apply a diff to a file, guarded by its expected hash.
    pub fn apply_patch(&mut self, request: &PatchRequest) -> Result<EditOutcome, EditError> {
        self.execute(&EditRequest::Patch(request.clone()))
    }

    /// Overwrite (or create) a file, guarded by its expected hash.
    pub fn write_file(&mut self, request: &WriteRequest) -> Result<EditOutcome, EditError> {
        self.execute(&EditRequest::Write(request.clone()))
    }

    /// Run a mutating operation: verify, transform, write, stamp.
    ///
    /// This does not consult the confirmation gate; callers that want a human
    /// in the loop go through [`should_confirm`](Self::should_confirm) first.
    pub fn execute(&mut self, request: &EditRequest) -> Result<EditOutcome, EditError> {
        let path = self.resolve_path(request.path())?;
        let ctx = PlanContext {
            options: self.config.apply_options(),
            max_diff_bytes: self.config.patch.max_diff_bytes,
            failure_log: Some(&self.failure_log),
        };

        let planned = match edit::plan(&path, request, &ctx)? {
            Plan::Ready(planned) => planned,
            Plan::Rejected(outcome) => {
                info!(path = %path.display(), "{}", outcome.message());
                return Ok(outcome);
            }
        };

        edit::commit(&planned, request.abort())?;
        let snapshot = self.versions.stamp(&path, planned.updated);

        let message = match request {
            EditRequest::Patch(_) => format!(
                "Applied diff to {} (version {}).",
                path.display(),
                snapshot.version
            ),
            EditRequest::Write(_) if planned.existed => format!(
                "Wrote {} (version {}).",
                path.display(),
                snapshot.version
            ),
            EditRequest::Write(_) => format!(
                "Created {} (version {}).",
                path.display(),
                snapshot.version
            ),
        };
        info!(
            path = %path.display(),
            version = snapshot.version,
            hash = %snapshot.content_hash,
            "edit committed"
        );

        Ok(EditOutcome::Success { message, snapshot })
    }

    /// Decide whether `request` needs a human's approval.
    ///
    /// Returns `None` when the category is always-allowed or confirmation is
    /// disabled (without touching disk), and when the operation is going to
    /// fail anyway: the caller should get that failure from
    /// [`execute`](Self::execute) rather than a misleading prompt.
    pub fn should_confirm(
        &mut self,
        request: &EditRequest,
    ) -> Result<Option<ConfirmationRequest>, EditError> {
        let category = request.category();
        if self.gate.bypasses(category) {
            debug!(%category, "confirmation bypassed");
            return Ok(None);
        }

        let path = self.resolve_path(request.path())?;
        let ctx = PlanContext {
            options: self.config.apply_options(),
            max_diff_bytes: self.config.patch.max_diff_bytes,
            failure_log: None,
        };

        match edit::plan(&path, request, &ctx)? {
            Plan::Ready(planned) => {
                let preview = PreviewPayload::for_edit(&planned);
                Ok(Some(self.gate.issue(request.clone(), preview)))
            }
            Plan::Rejected(outcome) => {
                debug!(path = %path.display(), "dry run fails; not prompting: {}", outcome.message());
                Ok(None)
            }
        }
    }

    /// Alias of [`should_confirm`](Self::should_confirm).
    pub fn preview(&mut self, request: &EditRequest) -> Result<Option<PreviewTicket>, EditError> {
        self.should_confirm(request)
    }

    /// Record a decision. Never performs the mutation.
    pub fn resolve(
        &mut self,
        ticket: &PreviewTicket,
        decision: Decision,
    ) -> Result<Resolution, ConfirmError> {
        self.gate.resolve(ticket, decision)
    }

    /// Abandon a ticket without deciding. See [`ConfirmationGate::withdraw`].
    pub fn withdraw(&mut self, ticket: PreviewTicket) -> bool {
        self.gate.withdraw(ticket)
    }

    /// Resolve `ticket` and, if the decision proceeds, run the operation.
    ///
    /// The operation re-verifies the hash, so changes made on disk while the
    /// human was deciding surface as a state mismatch. Returns `None` when
    /// rejected.
    pub fn commit(
        &mut self,
        ticket: PreviewTicket,
        decision: Decision,
    ) -> Result<Option<EditOutcome>, ConfirmError> {
        match self.resolve(&ticket, decision)? {
            Resolution::Rejected => {
                info!(path = %ticket.request().path().display(), "edit rejected");
                Ok(None)
            }
            Resolution::Proceed => {
                let request = ticket.into_request();
                Ok(Some(self.execute(&request)?))
            }
        }
    }

    fn resolve_path(&self, path: &Path) -> Result<PathBuf, EditError> {
        match &self.workspace {
            Some(guard) => Ok(guard.validate_path(path)?),
            None => Ok(path.to_path_buf()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn session_in(root: &Path) -> Session {
        let mut config = SafePatchConfig::default();
        config.workspace.root = Some(root.to_path_buf());
        Session::new(config).unwrap()
    }

    #[test]
    fn test_default_session_has_no_workspace() {
        let session = Session::default();
        assert!(session.workspace().is_none());
        assert_eq!(session.versions().last_issued(), 0);
        assert!(session.config().confirm.enabled);
    }

    #[test]
    fn test_missing_workspace_root_fails() {
        let mut config = SafePatchConfig::default();
        config.workspace.root = Some(PathBuf::from("/definitely/not/a/root"));
        assert!(matches!(
            Session::new(config),
            Err(SafetyError::Canonicalize { .. })
        ));
    }

    #[test]
    fn test_relative_paths_resolve_against_workspace() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "x\n").unwrap();
        let mut session = session_in(dir.path());

        let snapshot = session.read("a.txt").unwrap();
        assert!(snapshot.path.is_absolute());
        assert_eq!(snapshot.content, "x\n");
        assert_eq!(snapshot.version, 1);
    }

    #[test]
    fn test_forbidden_path_is_safety_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(dir.path());

        let request = WriteRequest::new(".git/config", "x", None);
        assert!(matches!(
            session.write_file(&request),
            Err(EditError::Safety(SafetyError::ForbiddenPath { .. }))
        ));
        assert!(!dir.path().join(".git").exists());
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::default();
        assert!(matches!(
            session.read(dir.path().join("absent")),
            Err(EditError::Io { .. })
        ));
        assert_eq!(session.versions().last_issued(), 0);
    }
}
