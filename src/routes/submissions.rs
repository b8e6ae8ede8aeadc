use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    audit::{self, AuditContext},
    auth::AuthenticatedUser,
    db,
    error::{AppError, AppResult},
    models::{Document, NewSubmission, Submission, SubmissionChangeset},
    schema::{documents, submissions},
    state::AppState,
    utils::json::{classify_nullable, optional_text},
    utils::time::{opt_iso, to_iso},
    workflow::{
        require_reason, transitions, AccessScopeGuard, Action, CompletenessEvaluator,
        CompletenessReport, DocumentCategory, DocumentSlot, FieldChange, JobRequirementCatalog,
        Principal, SubmissionStatus, Transition, WorkflowError,
    },
};

use super::tracking::{latest_for_submissions, TrackingSummary};
use super::{created, ok, ApiResult, Envelope};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Serialize)]
pub struct SubmissionResponse {
    pub id: Uuid,
    pub employee_nip: String,
    pub employee_name: String,
    pub job_classification: String,
    pub status: String,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub rejected_by: Option<Uuid>,
    pub rejected_at: Option<String>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<String>,
    pub resubmitted_by: Option<Uuid>,
    pub resubmitted_at: Option<String>,
    pub final_approved_by: Option<Uuid>,
    pub final_approved_at: Option<String>,
    pub final_rejected_by: Option<Uuid>,
    pub final_rejected_at: Option<String>,
    pub final_rejection_reason: Option<String>,
    pub office_id: Uuid,
    pub created_by: Uuid,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking: Option<TrackingSummary>,
}

pub(crate) fn to_submission_response(
    submission: Submission,
    tracking: Option<TrackingSummary>,
) -> SubmissionResponse {
    SubmissionResponse {
        id: submission.id,
        employee_nip: submission.employee_nip,
        employee_name: submission.employee_name,
        job_classification: submission.job_classification,
        status: submission.status,
        notes: submission.notes,
        rejection_reason: submission.rejection_reason,
        rejected_by: submission.rejected_by,
        rejected_at: opt_iso(submission.rejected_at),
        approved_by: submission.approved_by,
        approved_at: opt_iso(submission.approved_at),
        resubmitted_by: submission.resubmitted_by,
        resubmitted_at: opt_iso(submission.resubmitted_at),
        final_approved_by: submission.final_approved_by,
        final_approved_at: opt_iso(submission.final_approved_at),
        final_rejected_by: submission.final_rejected_by,
        final_rejected_at: opt_iso(submission.final_rejected_at),
        final_rejection_reason: submission.final_rejection_reason,
        office_id: submission.office_id,
        created_by: submission.created_by,
        created_at: to_iso(submission.created_at),
        updated_at: to_iso(submission.updated_at),
        tracking,
    }
}

#[derive(Serialize)]
pub struct SubmissionListResponse {
    pub items: Vec<SubmissionResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Deserialize, Default)]
pub struct SubmissionListQuery {
    pub status: Option<String>,
    pub office_id: Option<Uuid>,
    pub job_classification: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateSubmissionRequest {
    pub employee_nip: String,
    pub employee_name: String,
    pub job_classification: String,
    pub notes: Option<String>,
    pub office_id: Option<Uuid>,
}

#[derive(Deserialize, Default)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct JobClassificationRequest {
    pub job_classification: String,
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusOverrideRequest {
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct CompletenessQuery {
    pub stage: Option<String>,
}

#[derive(Serialize)]
pub struct DeletedResponse {
    pub id: Uuid,
    pub deleted: bool,
}

pub(crate) fn load_submission(conn: &mut PgConnection, id: Uuid) -> AppResult<Submission> {
    submissions::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_named("submission"))
}

/// Re-reads the row under `FOR UPDATE` inside the caller's transaction.
pub(crate) fn lock_submission(conn: &mut PgConnection, id: Uuid) -> AppResult<Submission> {
    submissions::table
        .find(id)
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_named("submission"))
}

pub(crate) fn persist_submission(
    conn: &mut PgConnection,
    submission: &Submission,
) -> AppResult<Submission> {
    let updated = diesel::update(submissions::table.find(submission.id))
        .set(&SubmissionChangeset::from(submission))
        .get_result(conn)?;
    Ok(updated)
}

pub(crate) fn stored_status(submission: &Submission) -> AppResult<SubmissionStatus> {
    Ok(transitions::current_status(submission)?)
}

pub(crate) fn evaluate_completeness(
    conn: &mut PgConnection,
    catalog: &dyn JobRequirementCatalog,
    submission: &Submission,
    stage: DocumentCategory,
) -> AppResult<CompletenessReport> {
    let requirement = catalog.resolve(conn, &submission.job_classification)?;
    if requirement.is_none() {
        warn!(
            submission_id = %submission.id,
            job_classification = %submission.job_classification,
            "no active job classification matched; no documents are required"
        );
    }

    let docs: Vec<Document> = documents::table
        .filter(documents::submission_id.eq(submission.id))
        .filter(documents::category.eq(stage.as_str()))
        .load(conn)?;

    Ok(CompletenessEvaluator::evaluate(
        &submission.job_classification,
        requirement.as_deref(),
        stage,
        docs.iter().filter_map(DocumentSlot::from_document),
    ))
}

fn filtered_query<'a>(
    principal: &Principal,
    query: &'a SubmissionListQuery,
    status: Option<SubmissionStatus>,
) -> submissions::BoxedQuery<'a, Pg> {
    let mut boxed = submissions::table.into_boxed();
    if let Some(office) = principal.office_id {
        boxed = boxed.filter(submissions::office_id.eq(office));
    }
    if let Some(office) = query.office_id {
        boxed = boxed.filter(submissions::office_id.eq(office));
    }
    if let Some(status) = status {
        boxed = boxed.filter(submissions::status.eq(status.as_str()));
    }
    if let Some(label) = query
        .job_classification
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        boxed = boxed.filter(submissions::job_classification.ilike(contains_pattern(label)));
    }
    boxed
}

/// `ILIKE` pattern matching `value` literally anywhere in the column.
fn contains_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

pub async fn list_submissions(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Query(query): Query<SubmissionListQuery>,
) -> ApiResult<SubmissionListResponse> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<SubmissionStatus>)
        .transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let mut conn = state.db()?;
    let total: i64 = filtered_query(&principal, &query, status)
        .select(count_star())
        .first(&mut conn)?;
    let rows: Vec<Submission> = filtered_query(&principal, &query, status)
        .order((submissions::created_at.desc(), submissions::id.asc()))
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let mut tracking = latest_for_submissions(&mut conn, &ids)?;
    let items = rows
        .into_iter()
        .map(|row| {
            let summary = tracking.remove(&row.id);
            to_submission_response(row, summary)
        })
        .collect();

    ok(SubmissionListResponse {
        items,
        total,
        limit,
        offset,
    })
}

fn required_text(value: &str, field: &str, max_len: usize) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > max_len {
        return Err(AppError::bad_request(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub async fn create_submission(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(payload): Json<CreateSubmissionRequest>,
) -> AppResult<(StatusCode, Json<Envelope<SubmissionResponse>>)> {
    let employee_nip = required_text(&payload.employee_nip, "employee_nip", 32)?;
    let employee_name = required_text(&payload.employee_name, "employee_name", 255)?;
    let job_classification =
        required_text(&payload.job_classification, "job_classification", 255)?;
    let notes = payload
        .notes
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    let office_id = match (principal.office_id, payload.office_id) {
        (Some(own), None) => own,
        (Some(own), Some(requested)) if own == requested => own,
        (Some(_), Some(_)) => {
            return Err(WorkflowError::forbidden(
                "submissions can only be created for your own office",
            )
            .into())
        }
        (None, Some(requested)) => requested,
        (None, None) => {
            return Err(AppError::bad_request(
                "office_id is required for principals without an office",
            ))
        }
    };
    AccessScopeGuard::authorize(&principal, Action::CreateSubmission, office_id)?;

    let mut conn = state.db()?;
    let submission = db::serializable(&mut conn, |conn| {
        let inserted: Submission = diesel::insert_into(submissions::table)
            .values(&NewSubmission {
                id: Uuid::new_v4(),
                employee_nip,
                employee_name,
                job_classification,
                status: SubmissionStatus::Draft.as_str().to_string(),
                notes,
                office_id,
                created_by: principal.user_id,
            })
            .get_result(conn)?;

        audit::record_changes(
            conn,
            &AuditContext {
                submission_id: inserted.id,
                action: "create",
                reason: None,
                actor: &principal,
                at: inserted.created_at,
            },
            vec![FieldChange::new(
                "status",
                None,
                Some(json!(SubmissionStatus::Draft.as_str())),
            )],
        )?;
        Ok(inserted)
    })?;

    info!(
        submission_id = %submission.id,
        office_id = %submission.office_id,
        actor = %principal.username,
        "submission created"
    );
    created(to_submission_response(submission, None))
}

pub async fn get_submission(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
) -> ApiResult<SubmissionResponse> {
    let mut conn = state.db()?;
    let submission = load_submission(&mut conn, submission_id)?;
    AccessScopeGuard::ensure_view(&principal, submission.office_id)?;
    let mut tracking = latest_for_submissions(&mut conn, &[submission.id])?;
    let summary = tracking.remove(&submission.id);
    ok(to_submission_response(submission, summary))
}

pub async fn edit_draft(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> ApiResult<SubmissionResponse> {
    let employee_name =
        optional_text(body.get("employee_name"), "employee_name").map_err(AppError::bad_request)?;
    let job_classification = optional_text(body.get("job_classification"), "job_classification")
        .map_err(AppError::bad_request)?;
    let notes = classify_nullable(body.get("notes"))
        .map_err(AppError::bad_request)?
        .into_update();

    let mut conn = state.db()?;
    let updated = db::serializable(&mut conn, |conn| {
        let current = lock_submission(conn, submission_id)?;
        AccessScopeGuard::authorize(&principal, Action::EditDraft, current.office_id)?;
        if stored_status(&current)? != SubmissionStatus::Draft {
            return Err(WorkflowError::invalid_state(format!(
                "only draft submissions can be edited, this one is '{}'",
                current.status
            ))
            .into());
        }

        let now = Utc::now().naive_utc();
        let mut next = current.clone();
        if let Some(name) = employee_name {
            next.employee_name = name;
        }
        if let Some(label) = job_classification {
            next.job_classification = label;
        }
        if let Some(notes) = notes {
            next.notes = notes;
        }

        let changes = transitions::submission_changes(&current, &next);
        if changes.is_empty() {
            return Ok(current);
        }
        next.updated_at = now;
        let saved = persist_submission(conn, &next)?;
        audit::record_changes(
            conn,
            &AuditContext {
                submission_id,
                action: "edit_draft",
                reason: None,
                actor: &principal,
                at: now,
            },
            changes,
        )?;
        Ok(saved)
    })?;

    ok(to_submission_response(updated, None))
}

pub async fn delete_submission(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
) -> ApiResult<DeletedResponse> {
    let mut conn = state.db()?;
    db::serializable(&mut conn, |conn| {
        let current = lock_submission(conn, submission_id)?;
        AccessScopeGuard::authorize(&principal, Action::DeleteSubmission, current.office_id)?;
        diesel::delete(submissions::table.find(submission_id)).execute(conn)?;
        Ok(())
    })?;

    warn!(
        submission_id = %submission_id,
        actor = %principal.username,
        "submission deleted with its documents, audit trail and tracking"
    );
    ok(DeletedResponse {
        id: submission_id,
        deleted: true,
    })
}

/// Runs one transition in a serializable transaction: lock, authorize,
/// gate, apply, persist, audit.
fn run_transition(
    state: &AppState,
    principal: &Principal,
    submission_id: Uuid,
    transition: Transition,
) -> AppResult<Submission> {
    let mut conn = state.db()?;
    let result = db::serializable(&mut conn, |conn| {
        let current = lock_submission(conn, submission_id)?;
        AccessScopeGuard::authorize(principal, transition.action(), current.office_id)?;
        let from = stored_status(&current)?;
        transition.check_source(from)?;

        let report = if transition.requires_completeness() {
            Some(evaluate_completeness(
                conn,
                state.catalog.as_ref(),
                &current,
                DocumentCategory::AdminWilayah,
            )?)
        } else {
            None
        };

        let now = Utc::now().naive_utc();
        let next = transition.apply(&current, principal, now, report.as_ref())?;
        let saved = persist_submission(conn, &next)?;
        audit::record_changes(
            conn,
            &AuditContext {
                submission_id,
                action: transition.name(),
                reason: transition.reason(),
                actor: principal,
                at: now,
            },
            transitions::submission_changes(&current, &next),
        )?;
        Ok((from, saved))
    });

    match result {
        Ok((from, saved)) => {
            info!(
                submission_id = %submission_id,
                transition = transition.name(),
                from = %from,
                to = %saved.status,
                actor = %principal.username,
                "submission transitioned"
            );
            Ok(saved)
        }
        Err(err) => {
            warn!(
                submission_id = %submission_id,
                transition = transition.name(),
                actor = %principal.username,
                error = %err,
                "submission transition refused"
            );
            Err(err)
        }
    }
}

fn reason_of(body: Option<Json<ReasonRequest>>) -> Option<String> {
    body.and_then(|Json(payload)| payload.reason)
}

pub async fn submit(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
) -> ApiResult<SubmissionResponse> {
    let saved = run_transition(&state, &principal, submission_id, Transition::Submit)?;
    ok(to_submission_response(saved, None))
}

pub async fn regional_approve(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
) -> ApiResult<SubmissionResponse> {
    let saved = run_transition(&state, &principal, submission_id, Transition::RegionalApprove)?;
    ok(to_submission_response(saved, None))
}

pub async fn regional_reject(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
    body: Option<Json<ReasonRequest>>,
) -> ApiResult<SubmissionResponse> {
    let transition = Transition::regional_reject(reason_of(body).as_deref())?;
    let saved = run_transition(&state, &principal, submission_id, transition)?;
    ok(to_submission_response(saved, None))
}

pub async fn submit_to_central(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
) -> ApiResult<SubmissionResponse> {
    let saved = run_transition(&state, &principal, submission_id, Transition::SubmitToCentral)?;
    ok(to_submission_response(saved, None))
}

pub async fn final_approve(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
) -> ApiResult<SubmissionResponse> {
    let saved = run_transition(&state, &principal, submission_id, Transition::FinalApprove)?;
    ok(to_submission_response(saved, None))
}

pub async fn final_reject(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
    body: Option<Json<ReasonRequest>>,
) -> ApiResult<SubmissionResponse> {
    let transition = Transition::final_reject(reason_of(body).as_deref())?;
    let saved = run_transition(&state, &principal, submission_id, transition)?;
    ok(to_submission_response(saved, None))
}

pub async fn return_to_regional(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
    body: Option<Json<ReasonRequest>>,
) -> ApiResult<SubmissionResponse> {
    let transition = Transition::return_to_regional(reason_of(body).as_deref())?;
    let saved = run_transition(&state, &principal, submission_id, transition)?;
    ok(to_submission_response(saved, None))
}

/// Applies an administrative change outside the transition table and
/// records it under `action`.
fn run_admin_change<F>(
    state: &AppState,
    principal: &Principal,
    submission_id: Uuid,
    action: Action,
    audit_action: &str,
    reason: Option<&str>,
    change: F,
) -> AppResult<Submission>
where
    F: FnOnce(&Submission, chrono::NaiveDateTime) -> AppResult<Submission>,
{
    let mut conn = state.db()?;
    let saved = db::serializable(&mut conn, |conn| {
        let current = lock_submission(conn, submission_id)?;
        AccessScopeGuard::authorize(principal, action, current.office_id)?;
        let now = Utc::now().naive_utc();
        let next = change(&current, now)?;
        let saved = persist_submission(conn, &next)?;
        audit::record_changes(
            conn,
            &AuditContext {
                submission_id,
                action: audit_action,
                reason,
                actor: principal,
                at: now,
            },
            transitions::submission_changes(&current, &next),
        )?;
        Ok(saved)
    })?;

    warn!(
        submission_id = %submission_id,
        action = audit_action,
        actor = %principal.username,
        "administrative change applied"
    );
    Ok(saved)
}

pub async fn edit_job_classification(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
    Json(payload): Json<JobClassificationRequest>,
) -> ApiResult<SubmissionResponse> {
    let label = required_text(&payload.job_classification, "job_classification", 255)?;
    let reason = payload
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let saved = run_admin_change(
        &state,
        &principal,
        submission_id,
        Action::EditJobClassification,
        "admin_edit_job_classification",
        reason,
        |current, now| {
            if current.job_classification == label {
                return Err(AppError::bad_request(
                    "job classification is unchanged",
                ));
            }
            let mut next = current.clone();
            next.job_classification = label.clone();
            next.updated_at = now;
            Ok(next)
        },
    )?;
    ok(to_submission_response(saved, None))
}

pub async fn override_status(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
    Json(payload): Json<StatusOverrideRequest>,
) -> ApiResult<SubmissionResponse> {
    let status: SubmissionStatus = payload.status.trim().parse()?;
    let reason = require_reason(payload.reason.as_deref(), "override a submission status")?;

    let saved = run_admin_change(
        &state,
        &principal,
        submission_id,
        Action::OverrideStatus,
        "admin_override_status",
        Some(&reason),
        |current, now| Ok(transitions::override_status(current, status, now)?),
    )?;
    ok(to_submission_response(saved, None))
}

pub async fn completeness(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
    Query(query): Query<CompletenessQuery>,
) -> ApiResult<CompletenessReport> {
    let stage = match query.stage.as_deref() {
        Some(raw) => raw.parse::<DocumentCategory>()?,
        None => DocumentCategory::AdminWilayah,
    };

    let mut conn = state.db()?;
    let submission = load_submission(&mut conn, submission_id)?;
    AccessScopeGuard::ensure_view(&principal, submission.office_id)?;
    let report = evaluate_completeness(&mut conn, state.catalog.as_ref(), &submission, stage)?;
    ok(report)
}
