use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    audit,
    auth::AuthenticatedUser,
    models::AuditLog,
    state::AppState,
    utils::time::to_iso,
    workflow::AccessScopeGuard,
};

use super::submissions::load_submission;
use super::{ok, ApiResult};

#[derive(Deserialize)]
pub struct AuditLogQuery {
    pub action: Option<String>,
}

#[derive(Serialize)]
pub struct AuditLogResponse {
    pub id: Uuid,
    pub seq: i64,
    pub submission_id: Uuid,
    pub action: String,
    pub field_name: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub reason: Option<String>,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub created_at: String,
}

impl From<AuditLog> for AuditLogResponse {
    fn from(entry: AuditLog) -> Self {
        Self {
            id: entry.id,
            seq: entry.seq,
            submission_id: entry.submission_id,
            action: entry.action,
            field_name: entry.field_name,
            old_value: entry.old_value,
            new_value: entry.new_value,
            reason: entry.reason,
            actor_id: entry.actor_id,
            actor_name: entry.actor_name,
            created_at: to_iso(entry.created_at),
        }
    }
}

pub async fn get_audit_log(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(submission_id): Path<Uuid>,
    Query(query): Query<AuditLogQuery>,
) -> ApiResult<Vec<AuditLogResponse>> {
    let action = query
        .action
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let mut conn = state.db()?;
    let submission = load_submission(&mut conn, submission_id)?;
    AccessScopeGuard::ensure_view(&principal, submission.office_id)?;

    let entries = audit::list_for_submission(&mut conn, submission_id, action)?;
    ok(entries.into_iter().map(AuditLogResponse::from).collect())
}
