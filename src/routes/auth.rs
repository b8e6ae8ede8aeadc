use axum::{extract::State, Json};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    auth::{password, AuthenticatedUser},
    error::AppError,
    models::User,
    schema::users::dsl,
    state::AppState,
    workflow::{Principal, Role},
};

use super::{ok, ApiResult};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: Principal,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let mut conn = state.db()?;

    let user: User = match dsl::users
        .filter(dsl::username.eq(payload.username.trim()))
        .first(&mut conn)
        .optional()?
    {
        Some(user) => user,
        None => return Err(AppError::unauthorized()),
    };

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        warn!(username = %user.username, "rejected login with wrong password");
        return Err(AppError::unauthorized());
    }

    let role: Role = user.role.parse()?;
    let access_token = state.jwt.generate_token(&user).map_err(AppError::from)?;
    info!(username = %user.username, role = %user.role, "user logged in");

    ok(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.jwt_expiry_minutes * 60,
        user: Principal {
            user_id: user.id,
            username: user.username,
            display_name: user.display_name,
            role,
            office_id: user.office_id,
        },
    })
}

pub async fn me(AuthenticatedUser(principal): AuthenticatedUser) -> ApiResult<Principal> {
    ok(principal)
}
