use axum::{extract::State, http::StatusCode, response::Json};
use diesel::prelude::*;
use diesel::sql_types::Integer;
use serde_json::json;
use tracing::warn;

use crate::state::AppState;

#[derive(QueryableByName)]
struct Ping {
    #[diesel(sql_type = Integer)]
    #[allow(dead_code)]
    one: i32,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let database = match state.db() {
        Ok(mut conn) => diesel::sql_query("SELECT 1 AS one")
            .get_result::<Ping>(&mut conn)
            .map(|_| "ok")
            .unwrap_or_else(|err| {
                warn!(error = %err, "health check query failed");
                "unavailable"
            }),
        Err(err) => {
            warn!(error = %err, "health check could not acquire a connection");
            "unavailable"
        }
    };

    let status = if database == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({ "success": status == StatusCode::OK, "data": { "status": database } })),
    )
}
