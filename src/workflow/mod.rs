//! Submission workflow core: vocabularies, authority rules, the
//! job-requirement catalog, completeness evaluation, document rules and the
//! transition table.
//!
//! Everything here is free of I/O except [`catalog::CachedCatalog`], which
//! reads the catalog tables through a connection handed in by the caller.
//! Route handlers load rows, call into these modules inside one transaction
//! and persist whatever they return.

pub mod access;
pub mod catalog;
pub mod completeness;
pub mod documents;
pub mod status;
pub mod transitions;

use thiserror::Error;

pub use access::{AccessScopeGuard, Action, DocumentOperation, Principal, Role};
pub use catalog::{CachedCatalog, JobRequirement, JobRequirementCatalog, RequirementEntry};
pub use completeness::{CompletenessEvaluator, CompletenessReport, DocumentSlot};
pub use documents::FileMetadata;
pub use status::{DocumentCategory, SubmissionStatus, UploadStatus, VerificationStatus};
pub use transitions::{FieldChange, Transition};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("required documents are missing or not approved: {}", missing.join(", "))]
    IncompleteDocuments { missing: Vec<String> },
    #[error("{0}")]
    Validation(String),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

impl WorkflowError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Trims a free-text reason and rejects it when empty.
pub fn require_reason(reason: Option<&str>, context: &str) -> WorkflowResult<String> {
    match reason.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(WorkflowError::validation(format!(
            "a reason is required to {context}"
        ))),
    }
}
