//! Append-only audit trail. One row per changed field.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{AuditLog, NewAuditLog};
use crate::schema::audit_logs;
use crate::workflow::{FieldChange, Principal};

/// Who did what, and why, for a batch of field changes.
pub struct AuditContext<'a> {
    pub submission_id: Uuid,
    pub action: &'a str,
    pub reason: Option<&'a str>,
    pub actor: &'a Principal,
    pub at: NaiveDateTime,
}

pub fn record_changes(
    conn: &mut PgConnection,
    context: &AuditContext<'_>,
    changes: Vec<FieldChange>,
) -> AppResult<usize> {
    if changes.is_empty() {
        return Ok(0);
    }

    let rows: Vec<NewAuditLog> = changes
        .into_iter()
        .map(|change| NewAuditLog {
            id: Uuid::new_v4(),
            submission_id: context.submission_id,
            action: context.action.to_string(),
            field_name: change.field,
            old_value: change.old_value,
            new_value: change.new_value,
            reason: context.reason.map(str::to_string),
            actor_id: context.actor.user_id,
            actor_name: context.actor.display_name.clone(),
            created_at: context.at,
        })
        .collect();

    let inserted = diesel::insert_into(audit_logs::table)
        .values(&rows)
        .execute(conn)?;
    Ok(inserted)
}

/// Newest first; ties within one transaction fall back to insertion order.
pub fn list_for_submission(
    conn: &mut PgConnection,
    submission_id: Uuid,
    action: Option<&str>,
) -> AppResult<Vec<AuditLog>> {
    let mut query = audit_logs::table
        .filter(audit_logs::submission_id.eq(submission_id))
        .into_boxed();
    if let Some(action) = action {
        query = query.filter(audit_logs::action.eq(action.to_string()));
    }
    let rows = query
        .order((audit_logs::created_at.desc(), audit_logs::seq.desc()))
        .load::<AuditLog>(conn)?;
    Ok(rows)
}
