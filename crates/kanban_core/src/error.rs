//! Caller-facing error taxonomy.
//!
//! # Invariants
//! - Every variant except `Storage` and `WorkerStopped` is recoverable and
//!   guarantees that no partial state was committed.
//! - `Storage` wraps persistence failures as-is; callers must halt the write
//!   path when they see it.

use crate::repo::RepoError;
use crate::transfer::import::ConflictReport;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type KanbanResult<T> = Result<T, KanbanError>;

/// Errors returned by engine operations.
#[derive(Debug)]
pub enum KanbanError {
    /// A referential rule would be broken; operation aborted.
    IntegrityViolation { reason: String },
    /// Stale or invalid entity id.
    UnknownEntity(String),
    /// Story code does not name a live story.
    UnknownStory(String),
    /// Hard delete attempted without the confirmation flag.
    ConfirmationRequired(String),
    /// Import document major version differs from the supported one.
    SchemaVersionMismatch { found: String, supported: String },
    /// Import found conflicting entities and no resolution was requested.
    ImportConflict(Vec<ConflictReport>),
    /// Lifecycle action not allowed from the entity's current state.
    InvalidTransition {
        id: String,
        from: &'static str,
        action: &'static str,
    },
    /// Caller input failed field validation.
    Validation(String),
    /// Import document could not be decoded.
    InvalidDocument(String),
    /// Background operation observed its cancellation flag.
    Cancelled,
    /// Background worker thread is gone.
    WorkerStopped,
    /// Underlying storage failure.
    Storage(RepoError),
}

impl KanbanError {
    pub(crate) fn integrity(reason: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::IntegrityViolation { .. } => "integrity_violation",
            Self::UnknownEntity(_) => "unknown_entity",
            Self::UnknownStory(_) => "unknown_story",
            Self::ConfirmationRequired(_) => "confirmation_required",
            Self::SchemaVersionMismatch { .. } => "schema_version_mismatch",
            Self::ImportConflict(_) => "import_conflict",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Validation(_) => "validation",
            Self::InvalidDocument(_) => "invalid_document",
            Self::Cancelled => "cancelled",
            Self::WorkerStopped => "worker_stopped",
            Self::Storage(_) => "storage",
        }
    }

    /// Whether the caller can retry or correct input without halting.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::WorkerStopped)
    }
}

impl Display for KanbanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IntegrityViolation { reason } => write!(f, "integrity violation: {reason}"),
            Self::UnknownEntity(id) => write!(f, "unknown entity: {id}"),
            Self::UnknownStory(code) => write!(f, "unknown story: {code}"),
            Self::ConfirmationRequired(id) => {
                write!(f, "hard delete of {id} requires explicit confirmation")
            }
            Self::SchemaVersionMismatch { found, supported } => write!(
                f,
                "schema version {found} is not compatible with supported {supported}"
            ),
            Self::ImportConflict(conflicts) => {
                write!(f, "import rejected: {} conflicting entities", conflicts.len())
            }
            Self::InvalidTransition { id, from, action } => {
                write!(f, "cannot {action} {id} from state {from}")
            }
            Self::Validation(message) => write!(f, "invalid input: {message}"),
            Self::InvalidDocument(message) => write!(f, "invalid import document: {message}"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::WorkerStopped => write!(f, "background worker stopped"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for KanbanError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for KanbanError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}
