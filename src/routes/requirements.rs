use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::{prelude::*, PgConnection};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{JobClassification, JobDocumentRequirement, NewJobClassification, NewJobDocumentRequirement},
    schema::{job_classifications, job_document_requirements},
    state::AppState,
    workflow::{
        catalog::{assemble, load_for_classification},
        documents::normalize_document_type,
        AccessScopeGuard, Action, DocumentCategory, JobRequirement, RequirementEntry,
    },
};

use super::{created, ok, ApiResult, Envelope};

#[derive(Deserialize)]
pub struct RequirementListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Deserialize)]
pub struct JobRequirementRequest {
    pub name: String,
    pub active: Option<bool>,
    #[serde(default)]
    pub kabupaten: Vec<RequirementEntry>,
    #[serde(default)]
    pub admin_wilayah: Vec<RequirementEntry>,
}

struct ValidatedRequirement {
    name: String,
    active: bool,
    stages: Vec<(DocumentCategory, Vec<RequirementEntry>)>,
}

fn validate_entries(
    stage: DocumentCategory,
    entries: Vec<RequirementEntry>,
) -> AppResult<Vec<RequirementEntry>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let document_type = normalize_document_type(&entry.document_type)?;
        if !seen.insert(document_type.clone()) {
            return Err(AppError::bad_request(format!(
                "document type '{document_type}' is listed twice for stage {stage}"
            )));
        }
        out.push(RequirementEntry {
            document_type,
            required: entry.required,
        });
    }
    Ok(out)
}

impl JobRequirementRequest {
    fn validate(self) -> AppResult<ValidatedRequirement> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::bad_request("name must not be empty"));
        }
        Ok(ValidatedRequirement {
            name,
            active: self.active.unwrap_or(true),
            stages: vec![
                (
                    DocumentCategory::Kabupaten,
                    validate_entries(DocumentCategory::Kabupaten, self.kabupaten)?,
                ),
                (
                    DocumentCategory::AdminWilayah,
                    validate_entries(DocumentCategory::AdminWilayah, self.admin_wilayah)?,
                ),
            ],
        })
    }
}

fn ensure_unique_name(
    conn: &mut PgConnection,
    name: &str,
    except: Option<Uuid>,
) -> AppResult<()> {
    let wanted = name.to_lowercase();
    let clash = job_classifications::table
        .select((job_classifications::id, job_classifications::name))
        .load::<(Uuid, String)>(conn)?
        .into_iter()
        .any(|(id, existing)| Some(id) != except && existing.to_lowercase() == wanted);
    if clash {
        return Err(AppError::conflict("job classification name already exists"));
    }
    Ok(())
}

fn write_entries(
    conn: &mut PgConnection,
    classification_id: Uuid,
    stages: &[(DocumentCategory, Vec<RequirementEntry>)],
) -> AppResult<()> {
    let rows: Vec<NewJobDocumentRequirement> = stages
        .iter()
        .flat_map(|(stage, entries)| {
            entries
                .iter()
                .enumerate()
                .map(move |(index, entry)| NewJobDocumentRequirement {
                    id: Uuid::new_v4(),
                    job_classification_id: classification_id,
                    stage: stage.as_str().to_string(),
                    document_type: entry.document_type.clone(),
                    required: entry.required,
                    sort_order: index as i32,
                })
        })
        .collect();

    if !rows.is_empty() {
        diesel::insert_into(job_document_requirements::table)
            .values(&rows)
            .execute(conn)?;
    }
    Ok(())
}

pub async fn list_requirements(
    State(state): State<AppState>,
    Query(query): Query<RequirementListQuery>,
) -> ApiResult<Vec<JobRequirement>> {
    let mut conn = state.db()?;

    let mut classifications = job_classifications::table.into_boxed();
    if !query.include_inactive {
        classifications = classifications.filter(job_classifications::active.eq(true));
    }
    let classifications: Vec<JobClassification> = classifications
        .order(job_classifications::name.asc())
        .load(&mut conn)?;

    let ids: Vec<Uuid> = classifications.iter().map(|c| c.id).collect();
    let rows: Vec<JobDocumentRequirement> = job_document_requirements::table
        .filter(job_document_requirements::job_classification_id.eq_any(&ids))
        .order((
            job_document_requirements::sort_order.asc(),
            job_document_requirements::document_type.asc(),
        ))
        .load(&mut conn)?;

    let mut grouped: HashMap<Uuid, Vec<JobDocumentRequirement>> = HashMap::new();
    for row in rows {
        grouped.entry(row.job_classification_id).or_default().push(row);
    }

    ok(classifications
        .into_iter()
        .map(|classification| {
            let rows = grouped.remove(&classification.id).unwrap_or_default();
            assemble(classification, rows)
        })
        .collect())
}

pub async fn create_requirement(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(payload): Json<JobRequirementRequest>,
) -> AppResult<(StatusCode, Json<Envelope<JobRequirement>>)> {
    let request = payload.validate()?;
    AccessScopeGuard::authorize_global(&principal, Action::ManageCatalog)?;

    let mut conn = state.db()?;
    let requirement = conn.transaction::<_, AppError, _>(|conn| {
        ensure_unique_name(conn, &request.name, None)?;
        let classification: JobClassification =
            diesel::insert_into(job_classifications::table)
                .values(&NewJobClassification {
                    id: Uuid::new_v4(),
                    name: request.name.clone(),
                    active: request.active,
                })
                .get_result(conn)?;
        write_entries(conn, classification.id, &request.stages)?;
        load_for_classification(conn, classification)
    })?;

    state.catalog.invalidate();
    info!(
        classification = %requirement.name,
        actor = %principal.username,
        "job requirement created"
    );
    created(requirement)
}

pub async fn update_requirement(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(classification_id): Path<Uuid>,
    Json(payload): Json<JobRequirementRequest>,
) -> ApiResult<JobRequirement> {
    let request = payload.validate()?;
    AccessScopeGuard::authorize_global(&principal, Action::ManageCatalog)?;

    let mut conn = state.db()?;
    let requirement = conn.transaction::<_, AppError, _>(|conn| {
        job_classifications::table
            .find(classification_id)
            .for_update()
            .first::<JobClassification>(conn)
            .optional()?
            .ok_or_else(|| AppError::not_found_named("job classification"))?;
        ensure_unique_name(conn, &request.name, Some(classification_id))?;

        let classification: JobClassification =
            diesel::update(job_classifications::table.find(classification_id))
                .set((
                    job_classifications::name.eq(&request.name),
                    job_classifications::active.eq(request.active),
                    job_classifications::updated_at.eq(Utc::now().naive_utc()),
                ))
                .get_result(conn)?;
        diesel::delete(
            job_document_requirements::table
                .filter(job_document_requirements::job_classification_id.eq(classification_id)),
        )
        .execute(conn)?;
        write_entries(conn, classification_id, &request.stages)?;
        load_for_classification(conn, classification)
    })?;

    state.catalog.invalidate();
    info!(
        classification = %requirement.name,
        active = requirement.active,
        actor = %principal.username,
        "job requirement updated"
    );
    ok(requirement)
}
