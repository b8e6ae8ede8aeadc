use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    db,
    error::{AppError, AppResult},
    models::{NewTrackingEntry, NewTrackingStatus, TrackingEntry, TrackingStatus},
    schema::{tracking_entries, tracking_statuses},
    state::AppState,
    utils::time::to_iso,
    workflow::{AccessScopeGuard, Action, SubmissionStatus, WorkflowError},
};

use super::submissions::{load_submission, lock_submission};
use super::{created, ok, ApiResult, Envelope};

#[derive(Serialize)]
pub struct TrackingStatusResponse {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub sort_order: i32,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<TrackingStatus> for TrackingStatusResponse {
    fn from(status: TrackingStatus) -> Self {
        Self {
            id: status.id,
            name: status.name,
            code: status.code,
            sort_order: status.sort_order,
            active: status.active,
            created_at: to_iso(status.created_at),
            updated_at: to_iso(status.updated_at),
        }
    }
}

/// The latest tracking entry of a submission, as shown in listings.
#[derive(Debug, Clone, Serialize)]
pub struct TrackingSummary {
    pub status_id: Uuid,
    pub code: String,
    pub name: String,
    pub note: Option<String>,
    pub estimated_duration: Option<String>,
    pub recorded_at: String,
}

#[derive(Serialize)]
pub struct TrackingEntryResponse {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub status: TrackingStatusRef,
    pub note: Option<String>,
    pub estimated_duration: Option<String>,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct TrackingStatusRef {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

fn to_entry_response(entry: TrackingEntry, status: TrackingStatus) -> TrackingEntryResponse {
    TrackingEntryResponse {
        id: entry.id,
        submission_id: entry.submission_id,
        status: TrackingStatusRef {
            id: status.id,
            code: status.code,
            name: status.name,
        },
        note: entry.note,
        estimated_duration: entry.estimated_duration,
        actor_id: entry.actor_id,
        actor_name: entry.actor_name,
        created_at: to_iso(entry.created_at),
    }
}

#[derive(Deserialize)]
pub struct StatusListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Deserialize)]
pub struct CreateTrackingStatusRequest {
    pub name: String,
    pub code: String,
    pub sort_order: Option<i32>,
    pub active: Option<bool>,
}

#[derive(Deserialize)]
pub struct UpdateTrackingStatusRequest {
    pub name: Option<String>,
    pub sort_order: Option<i32>,
    pub active: Option<bool>,
}

#[derive(AsChangeset)]
#[diesel(table_name = tracking_statuses)]
struct TrackingStatusChangeset<'a> {
    name: Option<&'a str>,
    sort_order: Option<i32>,
    active: Option<bool>,
    updated_at: chrono::NaiveDateTime,
}

#[derive(Deserialize)]
pub struct CreateTrackingEntryRequest {
    pub tracking_status_id: Uuid,
    pub note: Option<String>,
    pub estimated_duration: Option<String>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

pub async fn list_statuses(
    State(state): State<AppState>,
    Query(query): Query<StatusListQuery>,
) -> ApiResult<Vec<TrackingStatusResponse>> {
    let mut conn = state.db()?;
    let mut statuses = tracking_statuses::table.into_boxed();
    if !query.include_inactive {
        statuses = statuses.filter(tracking_statuses::active.eq(true));
    }
    let rows: Vec<TrackingStatus> = statuses
        .order((tracking_statuses::sort_order.asc(), tracking_statuses::name.asc()))
        .load(&mut conn)?;
    ok(rows.into_iter().map(TrackingStatusResponse::from).collect())
}

pub async fn create_status(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(payload): Json<CreateTrackingStatusRequest>,
) -> AppResult<(StatusCode, Json<Envelope<TrackingStatusResponse>>)> {
    let name = payload.name.trim();
    let code = payload.code.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    if code.is_empty() {
        return Err(AppError::bad_request("code must not be empty"));
    }
    AccessScopeGuard::authorize_global(&principal, Action::ManageTracking)?;

    let mut conn = state.db()?;
    let duplicate = tracking_statuses::table
        .filter(tracking_statuses::code.eq(code))
        .first::<TrackingStatus>(&mut conn)
        .optional()?;
    if duplicate.is_some() {
        return Err(AppError::conflict("tracking status code already exists"));
    }

    let new_status = NewTrackingStatus {
        id: Uuid::new_v4(),
        name: name.to_string(),
        code: code.to_string(),
        sort_order: payload.sort_order.unwrap_or(0),
        active: payload.active.unwrap_or(true),
    };
    let status: TrackingStatus = diesel::insert_into(tracking_statuses::table)
        .values(&new_status)
        .get_result(&mut conn)?;
    info!(code = %status.code, actor = %principal.username, "tracking status created");
    created(TrackingStatusResponse::from(status))
}

pub async fn update_status(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(status_id): Path<Uuid>,
    Json(payload): Json<UpdateTrackingStatusRequest>,
) -> ApiResult<TrackingStatusResponse> {
    let name = payload.name.as_deref().map(str::trim);
    if name == Some("") {
        return Err(AppError::bad_request("name must not be empty"));
    }
    AccessScopeGuard::authorize_global(&principal, Action::ManageTracking)?;

    let mut conn = state.db()?;
    let changeset = TrackingStatusChangeset {
        name,
        sort_order: payload.sort_order,
        active: payload.active,
        updated_at: Utc::now().naive_utc(),
    };
    let updated: TrackingStatus = diesel::update(tracking_statuses::table.find(status_id))
        .set(&changeset)
        .get_result(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_named("tracking status"))?;
    info!(code = %updated.code, active = updated.active, "tracking status updated");
    ok(TrackingStatusResponse::from(updated))
}

pub async fn list_entries(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
) -> ApiResult<Vec<TrackingEntryResponse>> {
    let mut conn = state.db()?;
    let submission = load_submission(&mut conn, submission_id)?;
    AccessScopeGuard::ensure_view(&principal, submission.office_id)?;

    let rows: Vec<(TrackingEntry, TrackingStatus)> = tracking_entries::table
        .inner_join(tracking_statuses::table)
        .filter(tracking_entries::submission_id.eq(submission_id))
        .order((tracking_entries::created_at.desc(), tracking_entries::seq.desc()))
        .load(&mut conn)?;

    ok(rows
        .into_iter()
        .map(|(entry, status)| to_entry_response(entry, status))
        .collect())
}

pub async fn create_entry(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
    Json(payload): Json<CreateTrackingEntryRequest>,
) -> AppResult<(StatusCode, Json<Envelope<TrackingEntryResponse>>)> {
    let note = trimmed(payload.note);
    let estimated_duration = trimmed(payload.estimated_duration);
    if estimated_duration.as_ref().is_some_and(|value| value.len() > 64) {
        return Err(AppError::bad_request(
            "estimated_duration must be at most 64 characters",
        ));
    }

    let mut conn = state.db()?;
    let (entry, status) = db::serializable(&mut conn, |conn| {
        let submission = lock_submission(conn, submission_id)?;
        AccessScopeGuard::authorize(&principal, Action::ManageTracking, submission.office_id)?;
        if submission.status != SubmissionStatus::FinalApproved.as_str() {
            return Err(WorkflowError::invalid_state(format!(
                "tracking applies only to final_approved submissions, this one is '{}'",
                submission.status
            ))
            .into());
        }

        let status = active_status(conn, payload.tracking_status_id)?;
        let entry: TrackingEntry = diesel::insert_into(tracking_entries::table)
            .values(&NewTrackingEntry {
                id: Uuid::new_v4(),
                submission_id,
                tracking_status_id: status.id,
                note,
                estimated_duration,
                actor_id: principal.user_id,
                actor_name: principal.display_name.clone(),
            })
            .get_result(conn)?;
        Ok((entry, status))
    })?;

    info!(
        submission_id = %submission_id,
        tracking_status = %status.code,
        actor = %principal.username,
        "tracking entry recorded"
    );
    created(to_entry_response(entry, status))
}

fn active_status(conn: &mut PgConnection, status_id: Uuid) -> AppResult<TrackingStatus> {
    let status: TrackingStatus = tracking_statuses::table
        .find(status_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_named("tracking status"))?;
    if !status.active {
        return Err(AppError::bad_request(format!(
            "tracking status '{}' is inactive",
            status.code
        )));
    }
    Ok(status)
}

/// Latest entry per submission for the given ids.
pub(crate) fn latest_for_submissions(
    conn: &mut PgConnection,
    submission_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, TrackingSummary>> {
    if submission_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(TrackingEntry, TrackingStatus)> = tracking_entries::table
        .inner_join(tracking_statuses::table)
        .filter(tracking_entries::submission_id.eq_any(submission_ids))
        .order((
            tracking_entries::submission_id.asc(),
            tracking_entries::created_at.desc(),
            tracking_entries::seq.desc(),
        ))
        .load(conn)?;

    let mut latest = HashMap::new();
    for (entry, status) in rows {
        latest.entry(entry.submission_id).or_insert_with(|| TrackingSummary {
            status_id: status.id,
            code: status.code,
            name: status.name,
            note: entry.note,
            estimated_duration: entry.estimated_duration,
            recorded_at: to_iso(entry.created_at),
        });
    }
    Ok(latest)
}
