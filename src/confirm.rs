//! Confirmation gate.
//!
//! Confirmation is a two-step protocol: a non-mutating preview issues a
//! [`PreviewTicket`], and a later [`Decision`] resolves it. Resolving never
//! writes anything; a caller that gets [`Resolution::Proceed`] still has to run
//! the mutating operation, which re-verifies the file hash because arbitrary
//! time may have passed since the preview.

use crate::edit::{EditError, EditRequest, PlannedEdit};
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

/// Category of operation an Always-Allow flag applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum OperationCategory {
    FileModification,
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationCategory::FileModification => write!(f, "file modification"),
        }
    }
}

impl EditRequest {
    pub fn category(&self) -> OperationCategory {
        match self {
            EditRequest::Patch(_) | EditRequest::Write(_) => OperationCategory::FileModification,
        }
    }
}

/// How the human answered a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    ProceedOnce,
    /// Proceed, and stop asking for this category for the rest of the session
    ProceedAlways,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Proceed,
    Rejected,
}

/// Preview shown to the human before a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreviewPayload {
    Edit {
        file_name: String,
        diff_text: String,
        original_content: String,
        new_content: String,
    },
}

impl PreviewPayload {
    pub(crate) fn for_edit(planned: &PlannedEdit) -> Self {
        let file_name = planned.path.display().to_string();
        let old_header = if planned.existed {
            format!("a/{file_name}")
        } else {
            "/dev/null".to_string()
        };
        let new_header = format!("b/{file_name}");
        let diff_text = TextDiff::from_lines(&planned.original, &planned.updated)
            .unified_diff()
            .context_radius(3)
            .header(&old_header, &new_header)
            .to_string();

        PreviewPayload::Edit {
            file_name,
            diff_text,
            original_content: planned.original.clone(),
            new_content: planned.updated.clone(),
        }
    }

    pub fn diff_text(&self) -> &str {
        match self {
            PreviewPayload::Edit { diff_text, .. } => diff_text,
        }
    }
}

/// A pending confirmation. Single use: resolving consumes its slot in the gate.
#[derive(Debug, Clone)]
#[must_use = "a PreviewTicket must be resolved with a Decision"]
pub struct PreviewTicket {
    id: u64,
    category: OperationCategory,
    request: EditRequest,
    pub preview: PreviewPayload,
}

/// What [`should_confirm`](crate::Session::should_confirm) hands back when a
/// human needs to look at the change.
pub type ConfirmationRequest = PreviewTicket;

impl PreviewTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn category(&self) -> OperationCategory {
        self.category
    }

    /// The operation to run once the ticket resolves to proceed.
    pub fn request(&self) -> &EditRequest {
        &self.request
    }

    pub fn into_request(self) -> EditRequest {
        self.request
    }
}

#[derive(Error, Debug)]
pub enum ConfirmError {
    #[error("confirmation ticket {0} is unknown or was already resolved")]
    UnknownTicket(u64),

    #[error(transparent)]
    Edit(#[from] EditError),
}

/// Session-scoped Always-Allow flags. Once set, a flag stays set for the
/// lifetime of the session.
#[derive(Debug, Default, Clone)]
pub struct AlwaysAllow {
    categories: HashSet<OperationCategory>,
}

impl AlwaysAllow {
    pub fn is_allowed(&self, category: OperationCategory) -> bool {
        self.categories.contains(&category)
    }

    fn allow(&mut self, category: OperationCategory) {
        self.categories.insert(category);
    }
}

#[derive(Debug)]
pub struct ConfirmationGate {
    enabled: bool,
    always_allow: AlwaysAllow,
    pending: HashSet<u64>,
    next_ticket: u64,
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConfirmationGate {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            always_allow: AlwaysAllow::default(),
            pending: HashSet::new(),
            next_ticket: 0,
        }
    }

    /// True when no confirmation is needed for `category`, without looking at disk.
    pub fn bypasses(&self, category: OperationCategory) -> bool {
        !self.enabled || self.always_allow.is_allowed(category)
    }

    pub fn always_allow(&self) -> &AlwaysAllow {
        &self.always_allow
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn issue(&mut self, request: EditRequest, preview: PreviewPayload) -> PreviewTicket {
        self.next_ticket += 1;
        let id = self.next_ticket;
        self.pending.insert(id);
        let category = request.category();
        debug!(ticket = id, %category, path = %request.path().display(), "confirmation requested");
        PreviewTicket {
            id,
            category,
            request,
            preview,
        }
    }

    /// Drop a ticket that will never be answered, such as when the caller
    /// abandons the prompt. Returns false if it was already resolved.
    ///
    /// Unanswered tickets are otherwise kept for the whole session.
    pub fn withdraw(&mut self, ticket: PreviewTicket) -> bool {
        let removed = self.pending.remove(&ticket.id);
        if removed {
            debug!(ticket = ticket.id, "confirmation withdrawn");
        }
        removed
    }

    /// Record the human's decision. Never performs the mutation.
    pub fn resolve(
        &mut self,
        ticket: &PreviewTicket,
        decision: Decision,
    ) -> Result<Resolution, ConfirmError> {
        if !self.pending.remove(&ticket.id) {
            return Err(ConfirmError::UnknownTicket(ticket.id));
        }

        let resolution = match decision {
            Decision::ProceedOnce => Resolution::Proceed,
            Decision::ProceedAlways => {
                self.always_allow.allow(ticket.category);
                info!(category = %ticket.category, "always allowing for the rest of the session");
                Resolution::Proceed
            }
            Decision::Reject => Resolution::Rejected,
        };
        debug!(ticket = ticket.id, ?decision, ?resolution, "confirmation resolved");
        Ok(resolution)
    }
}
