use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    pub role: String,
    pub office_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    pub role: String,
    pub office_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = job_classifications)]
pub struct JobClassification {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = job_classifications)]
pub struct NewJobClassification {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = job_document_requirements)]
#[diesel(belongs_to(JobClassification))]
pub struct JobDocumentRequirement {
    pub id: Uuid,
    pub job_classification_id: Uuid,
    pub stage: String,
    pub document_type: String,
    pub required: bool,
    pub sort_order: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = job_document_requirements)]
pub struct NewJobDocumentRequirement {
    pub id: Uuid,
    pub job_classification_id: Uuid,
    pub stage: String,
    pub document_type: String,
    pub required: bool,
    pub sort_order: i32,
}

/// A submission row. Status and the actor/timestamp pairs are only ever
/// written through the workflow transition functions or an audited
/// administrative override.
#[derive(Debug, Clone, PartialEq, Queryable, Identifiable)]
#[diesel(table_name = submissions)]
pub struct Submission {
    pub id: Uuid,
    pub employee_nip: String,
    pub employee_name: String,
    pub job_classification: String,
    pub status: String,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub rejected_by: Option<Uuid>,
    pub rejected_at: Option<NaiveDateTime>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<NaiveDateTime>,
    pub resubmitted_by: Option<Uuid>,
    pub resubmitted_at: Option<NaiveDateTime>,
    pub final_approved_by: Option<Uuid>,
    pub final_approved_at: Option<NaiveDateTime>,
    pub final_rejected_by: Option<Uuid>,
    pub final_rejected_at: Option<NaiveDateTime>,
    pub final_rejection_reason: Option<String>,
    pub office_id: Uuid,
    pub created_by: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = submissions)]
pub struct NewSubmission {
    pub id: Uuid,
    pub employee_nip: String,
    pub employee_name: String,
    pub job_classification: String,
    pub status: String,
    pub notes: Option<String>,
    pub office_id: Uuid,
    pub created_by: Uuid,
}

/// Full write-back of the mutable submission columns. `treat_none_as_null`
/// lets a resubmission clear rejection markers.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = submissions)]
#[diesel(treat_none_as_null = true)]
pub struct SubmissionChangeset<'a> {
    pub employee_name: &'a str,
    pub job_classification: &'a str,
    pub status: &'a str,
    pub notes: Option<&'a str>,
    pub rejection_reason: Option<&'a str>,
    pub rejected_by: Option<Uuid>,
    pub rejected_at: Option<NaiveDateTime>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<NaiveDateTime>,
    pub resubmitted_by: Option<Uuid>,
    pub resubmitted_at: Option<NaiveDateTime>,
    pub final_approved_by: Option<Uuid>,
    pub final_approved_at: Option<NaiveDateTime>,
    pub final_rejected_by: Option<Uuid>,
    pub final_rejected_at: Option<NaiveDateTime>,
    pub final_rejection_reason: Option<&'a str>,
    pub updated_at: NaiveDateTime,
}

impl<'a> From<&'a Submission> for SubmissionChangeset<'a> {
    fn from(value: &'a Submission) -> Self {
        Self {
            employee_name: &value.employee_name,
            job_classification: &value.job_classification,
            status: &value.status,
            notes: value.notes.as_deref(),
            rejection_reason: value.rejection_reason.as_deref(),
            rejected_by: value.rejected_by,
            rejected_at: value.rejected_at,
            approved_by: value.approved_by,
            approved_at: value.approved_at,
            resubmitted_by: value.resubmitted_by,
            resubmitted_at: value.resubmitted_at,
            final_approved_by: value.final_approved_by,
            final_approved_at: value.final_approved_at,
            final_rejected_by: value.final_rejected_by,
            final_rejected_at: value.final_rejected_at,
            final_rejection_reason: value.final_rejection_reason.as_deref(),
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Associations)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(Submission))]
pub struct Document {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub category: String,
    pub document_type: String,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub content_type: Option<String>,
    pub upload_status: String,
    pub verification_status: String,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<NaiveDateTime>,
    pub verification_notes: Option<String>,
    pub uploaded_by: Uuid,
    pub uploaded_by_role: String,
    pub uploaded_by_name: String,
    pub uploaded_by_office: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub category: String,
    pub document_type: String,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub content_type: Option<String>,
    pub upload_status: String,
    pub verification_status: String,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<NaiveDateTime>,
    pub uploaded_by: Uuid,
    pub uploaded_by_role: String,
    pub uploaded_by_name: String,
    pub uploaded_by_office: Option<Uuid>,
}

impl From<&Document> for NewDocument {
    fn from(value: &Document) -> Self {
        Self {
            id: value.id,
            submission_id: value.submission_id,
            category: value.category.clone(),
            document_type: value.document_type.clone(),
            file_name: value.file_name.clone(),
            file_path: value.file_path.clone(),
            file_size: value.file_size,
            content_type: value.content_type.clone(),
            upload_status: value.upload_status.clone(),
            verification_status: value.verification_status.clone(),
            verified_by: value.verified_by,
            verified_at: value.verified_at,
            uploaded_by: value.uploaded_by,
            uploaded_by_role: value.uploaded_by_role.clone(),
            uploaded_by_name: value.uploaded_by_name.clone(),
            uploaded_by_office: value.uploaded_by_office,
        }
    }
}

/// Columns overwritten when an upload hits an existing
/// (submission, type, category) slot or a document is replaced.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = documents)]
#[diesel(treat_none_as_null = true)]
pub struct DocumentChangeset<'a> {
    pub file_name: &'a str,
    pub file_path: &'a str,
    pub file_size: i64,
    pub content_type: Option<&'a str>,
    pub upload_status: &'a str,
    pub verification_status: &'a str,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<NaiveDateTime>,
    pub verification_notes: Option<&'a str>,
    pub uploaded_by: Uuid,
    pub uploaded_by_role: &'a str,
    pub uploaded_by_name: &'a str,
    pub uploaded_by_office: Option<Uuid>,
    pub updated_at: NaiveDateTime,
}

impl<'a> From<&'a Document> for DocumentChangeset<'a> {
    fn from(value: &'a Document) -> Self {
        Self {
            file_name: &value.file_name,
            file_path: &value.file_path,
            file_size: value.file_size,
            content_type: value.content_type.as_deref(),
            upload_status: &value.upload_status,
            verification_status: &value.verification_status,
            verified_by: value.verified_by,
            verified_at: value.verified_at,
            verification_notes: value.verification_notes.as_deref(),
            uploaded_by: value.uploaded_by,
            uploaded_by_role: &value.uploaded_by_role,
            uploaded_by_name: &value.uploaded_by_name,
            uploaded_by_office: value.uploaded_by_office,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = audit_logs)]
#[diesel(belongs_to(Submission))]
pub struct AuditLog {
    pub id: Uuid,
    pub seq: i64,
    pub submission_id: Uuid,
    pub action: String,
    pub field_name: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub reason: Option<String>,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = audit_logs)]
pub struct NewAuditLog {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub action: String,
    pub field_name: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub reason: Option<String>,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = tracking_statuses)]
pub struct TrackingStatus {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub sort_order: i32,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tracking_statuses)]
pub struct NewTrackingStatus {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub sort_order: i32,
    pub active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = tracking_entries)]
#[diesel(belongs_to(Submission))]
#[diesel(belongs_to(TrackingStatus))]
pub struct TrackingEntry {
    pub id: Uuid,
    pub seq: i64,
    pub submission_id: Uuid,
    pub tracking_status_id: Uuid,
    pub note: Option<String>,
    pub estimated_duration: Option<String>,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tracking_entries)]
pub struct NewTrackingEntry {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub tracking_status_id: Uuid,
    pub note: Option<String>,
    pub estimated_duration: Option<String>,
    pub actor_id: Uuid,
    pub actor_name: String,
}
