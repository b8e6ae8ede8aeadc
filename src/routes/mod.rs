use axum::http::{HeaderValue, StatusCode};
use axum::{
    middleware,
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{auth::AuthenticatedUser, error::AppResult, state::AppState};

pub mod audit;
pub mod auth;
pub mod documents;
pub mod health;
pub mod requirements;
pub mod submissions;
pub mod tracking;

/// Success envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

pub type ApiResult<T> = AppResult<Json<Envelope<T>>>;

pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope {
        success: true,
        data,
    }))
}

pub fn created<T: Serialize>(data: T) -> AppResult<(StatusCode, Json<Envelope<T>>)> {
    Ok((
        StatusCode::CREATED,
        Json(Envelope {
            success: true,
            data,
        }),
    ))
}

fn cors_layer(state: &AppState) -> anyhow::Result<CorsLayer> {
    let allow_origin = match state.config.cors_allowed_origin.as_ref() {
        Some(origins) => {
            let headers = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(|value| {
                    value
                        .parse::<HeaderValue>()
                        .map_err(|err| anyhow::anyhow!("invalid CORS allowed origin {value}: {err}"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
        .allow_credentials(true))
}

pub fn create_router(state: AppState) -> anyhow::Result<Router<()>> {
    let cors = cors_layer(&state)?;

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let submissions_routes = Router::new()
        .route(
            "/",
            get(submissions::list_submissions).post(submissions::create_submission),
        )
        .route(
            "/:id",
            get(submissions::get_submission)
                .patch(submissions::edit_draft)
                .delete(submissions::delete_submission),
        )
        .route("/:id/submit", post(submissions::submit))
        .route("/:id/regional-approve", post(submissions::regional_approve))
        .route("/:id/regional-reject", post(submissions::regional_reject))
        .route("/:id/submit-to-central", post(submissions::submit_to_central))
        .route("/:id/final-approve", post(submissions::final_approve))
        .route("/:id/final-reject", post(submissions::final_reject))
        .route(
            "/:id/return-to-regional",
            post(submissions::return_to_regional),
        )
        .route(
            "/:id/job-classification",
            patch(submissions::edit_job_classification),
        )
        .route("/:id/status", patch(submissions::override_status))
        .route("/:id/completeness", get(submissions::completeness))
        .route(
            "/:id/documents",
            get(documents::list_documents).post(documents::upload_document),
        )
        .route("/:id/audit-log", get(audit::get_audit_log))
        .route(
            "/:id/tracking",
            get(tracking::list_entries).post(tracking::create_entry),
        );

    let documents_routes = Router::new()
        .route("/:id", put(documents::replace_document))
        .route("/:id/verify", post(documents::verify_document));

    let tracking_status_routes = Router::new()
        .route(
            "/",
            get(tracking::list_statuses).post(tracking::create_status),
        )
        .route("/:id", patch(tracking::update_status));

    let requirement_routes = Router::new()
        .route(
            "/",
            get(requirements::list_requirements).post(requirements::create_requirement),
        )
        .route("/:id", put(requirements::update_requirement));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/submissions", submissions_routes)
        .nest("/api/documents", documents_routes)
        .nest("/api/tracking-statuses", tracking_status_routes)
        .nest("/api/job-requirements", requirement_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Ok(Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors))
}
