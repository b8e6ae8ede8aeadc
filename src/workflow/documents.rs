//! Document rules: upload windows, replacement and verification.
//!
//! Each operation takes the current row (if any) and returns the row as it
//! must be persisted; the handler writes it and records
//! [`document_changes`] in the audit trail.

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{
    AccessScopeGuard, DocumentCategory, DocumentOperation, FieldChange, Principal,
    SubmissionStatus, UploadStatus, VerificationStatus, WorkflowError, WorkflowResult,
};
use crate::models::Document;
use crate::utils::time::to_iso;

/// Logical file metadata. Storage of the bytes happens elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileMetadata {
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl FileMetadata {
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.file_name.trim().is_empty() {
            return Err(WorkflowError::validation("file_name must not be empty"));
        }
        if self.file_path.trim().is_empty() {
            return Err(WorkflowError::validation("file_path must not be empty"));
        }
        if self.file_size < 0 {
            return Err(WorkflowError::validation("file_size must not be negative"));
        }
        Ok(())
    }
}

pub fn normalize_document_type(raw: &str) -> WorkflowResult<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(WorkflowError::validation("document_type must not be empty"));
    }
    if value.len() > 100 {
        return Err(WorkflowError::validation(
            "document_type must be at most 100 characters",
        ));
    }
    Ok(value.to_string())
}

/// Parses a verification decision; `pending` is not a decision.
pub fn parse_decision(raw: &str) -> WorkflowResult<VerificationStatus> {
    match raw.parse::<VerificationStatus>()? {
        VerificationStatus::Pending => Err(WorkflowError::validation(
            "decision must be 'approved' or 'rejected'",
        )),
        decision => Ok(decision),
    }
}

pub fn ensure_upload_window(
    status: SubmissionStatus,
    category: DocumentCategory,
) -> WorkflowResult<()> {
    if category.upload_window().contains(&status) {
        Ok(())
    } else {
        Err(WorkflowError::invalid_state(format!(
            "{category} documents cannot be uploaded while the submission is '{status}'"
        )))
    }
}

pub fn ensure_replaceable(status: SubmissionStatus) -> WorkflowResult<()> {
    if status == SubmissionStatus::Draft {
        return Err(WorkflowError::invalid_state(
            "documents of a draft submission are re-uploaded, not replaced",
        ));
    }
    if status.is_terminal() {
        return Err(WorkflowError::invalid_state(format!(
            "documents cannot be replaced once the submission is '{status}'"
        )));
    }
    Ok(())
}

pub fn ensure_verifiable(status: SubmissionStatus) -> WorkflowResult<()> {
    if status.is_terminal() {
        Err(WorkflowError::invalid_state(format!(
            "documents cannot be verified once the submission is '{status}'"
        )))
    } else {
        Ok(())
    }
}

pub fn stored_category(document: &Document) -> WorkflowResult<DocumentCategory> {
    document.category.parse().map_err(|_| {
        WorkflowError::invalid_state(format!(
            "document has unrecognised category '{}'",
            document.category
        ))
    })
}

fn stamp_uploader(document: &mut Document, meta: &FileMetadata, actor: &Principal, now: NaiveDateTime) {
    document.file_name = meta.file_name.trim().to_string();
    document.file_path = meta.file_path.trim().to_string();
    document.file_size = meta.file_size;
    document.content_type = meta.content_type.clone();
    document.uploaded_by = actor.user_id;
    document.uploaded_by_role = actor.role.as_str().to_string();
    document.uploaded_by_name = actor.display_name.clone();
    document.uploaded_by_office = actor.office_id;
    document.updated_at = now;
}

fn set_verification(
    document: &mut Document,
    verification: VerificationStatus,
    verifier: Option<Uuid>,
    at: Option<NaiveDateTime>,
    notes: Option<String>,
) {
    document.verification_status = verification.as_str().to_string();
    document.upload_status = verification.upload_status().as_str().to_string();
    document.verified_by = verifier;
    document.verified_at = at;
    document.verification_notes = notes;
}

pub struct UploadPlan<'a> {
    pub submission_id: Uuid,
    pub owning_office: Uuid,
    pub status: SubmissionStatus,
    pub category: DocumentCategory,
    pub document_type: &'a str,
    pub metadata: &'a FileMetadata,
}

/// Creates or overwrites the single document for
/// (submission, document type, category).
pub fn upload(
    plan: UploadPlan<'_>,
    existing: Option<&Document>,
    actor: &Principal,
    now: NaiveDateTime,
) -> WorkflowResult<Document> {
    plan.metadata.validate()?;
    AccessScopeGuard::authorize_document(
        actor,
        DocumentOperation::Upload,
        plan.category,
        plan.owning_office,
    )?;
    ensure_upload_window(plan.status, plan.category)?;

    let mut document = match existing {
        Some(current) => current.clone(),
        None => Document {
            id: Uuid::new_v4(),
            submission_id: plan.submission_id,
            category: plan.category.as_str().to_string(),
            document_type: plan.document_type.to_string(),
            file_name: String::new(),
            file_path: String::new(),
            file_size: 0,
            content_type: None,
            upload_status: UploadStatus::Uploaded.as_str().to_string(),
            verification_status: VerificationStatus::Pending.as_str().to_string(),
            verified_by: None,
            verified_at: None,
            verification_notes: None,
            uploaded_by: actor.user_id,
            uploaded_by_role: actor.role.as_str().to_string(),
            uploaded_by_name: actor.display_name.clone(),
            uploaded_by_office: actor.office_id,
            created_at: now,
            updated_at: now,
        },
    };

    stamp_uploader(&mut document, plan.metadata, actor, now);
    if actor.role.self_attests(plan.category) {
        set_verification(
            &mut document,
            VerificationStatus::Approved,
            Some(actor.user_id),
            Some(now),
            None,
        );
    } else {
        set_verification(&mut document, VerificationStatus::Pending, None, None, None);
    }
    Ok(document)
}

/// Overwrites an existing document in place and resets its verification.
pub fn replace(
    current: &Document,
    status: SubmissionStatus,
    owning_office: Uuid,
    metadata: &FileMetadata,
    actor: &Principal,
    now: NaiveDateTime,
) -> WorkflowResult<Document> {
    metadata.validate()?;
    let category = stored_category(current)?;
    AccessScopeGuard::authorize_document(actor, DocumentOperation::Replace, category, owning_office)?;
    ensure_replaceable(status)?;

    let mut document = current.clone();
    stamp_uploader(&mut document, metadata, actor, now);
    set_verification(&mut document, VerificationStatus::Pending, None, None, None);
    Ok(document)
}

pub fn verify(
    current: &Document,
    status: SubmissionStatus,
    owning_office: Uuid,
    decision: VerificationStatus,
    notes: Option<&str>,
    verifier: &Principal,
    now: NaiveDateTime,
) -> WorkflowResult<Document> {
    if decision == VerificationStatus::Pending {
        return Err(WorkflowError::validation(
            "decision must be 'approved' or 'rejected'",
        ));
    }
    let category = stored_category(current)?;
    AccessScopeGuard::authorize_document(verifier, DocumentOperation::Verify, category, owning_office)?;
    ensure_verifiable(status)?;

    let notes = notes
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    let mut document = current.clone();
    set_verification(&mut document, decision, Some(verifier.user_id), Some(now), notes);
    document.updated_at = now;
    Ok(document)
}

fn opt_time(value: Option<NaiveDateTime>) -> Option<Value> {
    value.map(|dt| json!(to_iso(dt)))
}

fn audited_fields(document: &Document) -> Vec<(&'static str, Option<Value>)> {
    vec![
        ("file_name", Some(json!(document.file_name))),
        ("file_path", Some(json!(document.file_path))),
        ("file_size", Some(json!(document.file_size))),
        ("content_type", document.content_type.as_ref().map(|v| json!(v))),
        ("upload_status", Some(json!(document.upload_status))),
        ("verification_status", Some(json!(document.verification_status))),
        ("verified_by", document.verified_by.map(|v| json!(v))),
        ("verified_at", opt_time(document.verified_at)),
        (
            "verification_notes",
            document.verification_notes.as_ref().map(|v| json!(v)),
        ),
        ("uploaded_by", Some(json!(document.uploaded_by))),
    ]
}

/// Field-level changes of a document, prefixed with its slot so entries stay
/// readable in the submission's audit log. `before` is `None` for a fresh
/// upload.
pub fn document_changes(before: Option<&Document>, after: &Document) -> Vec<FieldChange> {
    let prefix = format!("document.{}.{}", after.category, after.document_type);
    let old_fields = before.map(audited_fields);
    audited_fields(after)
        .into_iter()
        .enumerate()
        .filter_map(|(index, (field, new))| {
            let old = old_fields
                .as_ref()
                .and_then(|fields| fields[index].1.clone());
            (old != new).then(|| FieldChange::new(format!("{prefix}.{field}"), old, new))
        })
        .collect()
}
