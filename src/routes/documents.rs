use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    audit::{self, AuditContext},
    auth::AuthenticatedUser,
    db,
    error::{AppError, AppResult},
    models::{Document, DocumentChangeset, NewDocument},
    schema::documents,
    state::AppState,
    utils::time::{opt_iso, to_iso},
    workflow::{
        documents::{self as rules, document_changes, UploadPlan},
        AccessScopeGuard, DocumentCategory, FileMetadata, Principal,
    },
};

use super::submissions::{load_submission, lock_submission, stored_status};
use super::{ok, ApiResult, Envelope};

#[derive(Serialize)]
pub struct DocumentResponse {
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
    pub verified_at: Option<String>,
    pub verification_notes: Option<String>,
    pub uploaded_by: Uuid,
    pub uploaded_by_role: String,
    pub uploaded_by_name: String,
    pub uploaded_by_office: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

pub(crate) fn to_document_response(document: Document) -> DocumentResponse {
    DocumentResponse {
        id: document.id,
        submission_id: document.submission_id,
        category: document.category,
        document_type: document.document_type,
        file_name: document.file_name,
        file_path: document.file_path,
        file_size: document.file_size,
        content_type: document.content_type,
        upload_status: document.upload_status,
        verification_status: document.verification_status,
        verified_by: document.verified_by,
        verified_at: opt_iso(document.verified_at),
        verification_notes: document.verification_notes,
        uploaded_by: document.uploaded_by,
        uploaded_by_role: document.uploaded_by_role,
        uploaded_by_name: document.uploaded_by_name,
        uploaded_by_office: document.uploaded_by_office,
        created_at: to_iso(document.created_at),
        updated_at: to_iso(document.updated_at),
    }
}

#[derive(Deserialize)]
pub struct UploadDocumentRequest {
    pub document_type: String,
    pub category: String,
    #[serde(flatten)]
    pub file: FileMetadata,
}

#[derive(Deserialize)]
pub struct VerifyDocumentRequest {
    pub decision: String,
    pub notes: Option<String>,
}

pub async fn list_documents(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
) -> ApiResult<Vec<DocumentResponse>> {
    let mut conn = state.db()?;
    let submission = load_submission(&mut conn, submission_id)?;
    AccessScopeGuard::ensure_view(&principal, submission.office_id)?;

    let rows: Vec<Document> = documents::table
        .filter(documents::submission_id.eq(submission_id))
        .order((documents::category.asc(), documents::document_type.asc()))
        .load(&mut conn)?;
    ok(rows.into_iter().map(to_document_response).collect())
}

fn audit_document(
    conn: &mut PgConnection,
    action: &str,
    reason: Option<&str>,
    actor: &Principal,
    before: Option<&Document>,
    after: &Document,
) -> AppResult<usize> {
    audit::record_changes(
        conn,
        &AuditContext {
            submission_id: after.submission_id,
            action,
            reason,
            actor,
            at: after.updated_at,
        },
        document_changes(before, after),
    )
}

pub async fn upload_document(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
    Json(payload): Json<UploadDocumentRequest>,
) -> AppResult<(StatusCode, Json<Envelope<DocumentResponse>>)> {
    let document_type = rules::normalize_document_type(&payload.document_type)?;
    let category: DocumentCategory = payload.category.trim().parse()?;
    payload.file.validate()?;

    let mut conn = state.db()?;
    let (document, replaced) = db::serializable(&mut conn, |conn| {
        let submission = lock_submission(conn, submission_id)?;
        let status = stored_status(&submission)?;

        let existing: Option<Document> = documents::table
            .filter(documents::submission_id.eq(submission_id))
            .filter(documents::document_type.eq(&document_type))
            .filter(documents::category.eq(category.as_str()))
            .for_update()
            .first(conn)
            .optional()?;

        let next = rules::upload(
            UploadPlan {
                submission_id,
                owning_office: submission.office_id,
                status,
                category,
                document_type: &document_type,
                metadata: &payload.file,
            },
            existing.as_ref(),
            &principal,
            Utc::now().naive_utc(),
        )?;

        let saved: Document = diesel::insert_into(documents::table)
            .values(&NewDocument::from(&next))
            .on_conflict((
                documents::submission_id,
                documents::document_type,
                documents::category,
            ))
            .do_update()
            .set(&DocumentChangeset::from(&next))
            .get_result(conn)?;

        audit_document(conn, "upload_document", None, &principal, existing.as_ref(), &saved)?;
        Ok((saved, existing.is_some()))
    })
    .inspect_err(|err| {
        warn!(
            submission_id = %submission_id,
            document_type = %document_type,
            category = %category,
            error = %err,
            "document upload refused"
        )
    })?;

    info!(
        submission_id = %submission_id,
        document_id = %document.id,
        document_type = %document.document_type,
        category = %document.category,
        verification = %document.verification_status,
        replaced,
        actor = %principal.username,
        "document uploaded"
    );
    let status = if replaced {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(Envelope {
            success: true,
            data: to_document_response(document),
        }),
    ))
}

/// Finds the owning submission id without locking, so rows are then locked
/// in submission-then-document order like uploads do.
fn owning_submission_id(conn: &mut PgConnection, document_id: Uuid) -> AppResult<Uuid> {
    documents::table
        .find(document_id)
        .select(documents::submission_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_named("document"))
}

fn lock_document(conn: &mut PgConnection, document_id: Uuid) -> AppResult<Document> {
    documents::table
        .find(document_id)
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_named("document"))
}

fn save_document(conn: &mut PgConnection, document: &Document) -> AppResult<Document> {
    let saved = diesel::update(documents::table.find(document.id))
        .set(&DocumentChangeset::from(document))
        .get_result(conn)?;
    Ok(saved)
}

pub async fn replace_document(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(document_id): Path<Uuid>,
    Json(file): Json<FileMetadata>,
) -> ApiResult<DocumentResponse> {
    file.validate()?;

    let mut conn = state.db()?;
    let saved = db::serializable(&mut conn, |conn| {
        let submission_id = owning_submission_id(conn, document_id)?;
        let submission = lock_submission(conn, submission_id)?;
        let current = lock_document(conn, document_id)?;
        let status = stored_status(&submission)?;

        let next = rules::replace(
            &current,
            status,
            submission.office_id,
            &file,
            &principal,
            Utc::now().naive_utc(),
        )?;
        let saved = save_document(conn, &next)?;
        audit_document(conn, "replace_document", None, &principal, Some(&current), &saved)?;
        Ok(saved)
    })
    .inspect_err(|err| {
        warn!(document_id = %document_id, error = %err, "document replacement refused")
    })?;

    info!(
        document_id = %saved.id,
        submission_id = %saved.submission_id,
        category = %saved.category,
        actor = %principal.username,
        "document replaced"
    );
    ok(to_document_response(saved))
}

pub async fn verify_document(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(document_id): Path<Uuid>,
    Json(payload): Json<VerifyDocumentRequest>,
) -> ApiResult<DocumentResponse> {
    let decision = rules::parse_decision(payload.decision.trim())?;

    let mut conn = state.db()?;
    let saved = db::serializable(&mut conn, |conn| {
        let submission_id = owning_submission_id(conn, document_id)?;
        let submission = lock_submission(conn, submission_id)?;
        let current = lock_document(conn, document_id)?;
        let status = stored_status(&submission)?;

        let next = rules::verify(
            &current,
            status,
            submission.office_id,
            decision,
            payload.notes.as_deref(),
            &principal,
            Utc::now().naive_utc(),
        )?;
        let saved = save_document(conn, &next)?;
        audit_document(
            conn,
            "verify_document",
            saved.verification_notes.as_deref(),
            &principal,
            Some(&current),
            &saved,
        )?;
        Ok(saved)
    })
    .inspect_err(|err| {
        warn!(document_id = %document_id, error = %err, "document verification refused")
    })?;

    info!(
        document_id = %saved.id,
        submission_id = %saved.submission_id,
        decision = %decision,
        actor = %principal.username,
        "document verified"
    );
    ok(to_document_response(saved))
}
