use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::info;

use moot_db::Database;
use moot_types::api::{Claims, CreateUserRequest, UpdateUserRequest, UserOut};

use crate::auth::{AppState, hash_password};
use crate::authz::{self, ADMIN_ONLY};
use crate::convert::{now_utc, user_out};
use crate::error::{ApiError, ApiResult};

pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ADMIN_ONLY)?;

    let users: Vec<UserOut> = state.db.list_users()?.into_iter().map(user_out).collect();
    Ok(Json(json!({ "users": users })))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ADMIN_ONLY)?;

    let user = state
        .db
        .get_user(user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(json!({ "user": user_out(user) })))
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ADMIN_ONLY)?;

    let hash = hash_password(&req.password)?;
    let user = match state
        .db
        .create_user(&req.username, &hash, req.is_active, req.is_admin, &now_utc())
    {
        Ok(user) => user,
        Err(err) if moot_db::is_unique_violation(&err) => {
            return Err(ApiError::conflict("User with this username already exists"));
        }
        Err(err) => return Err(err.into()),
    };

    Ok((StatusCode::CREATED, Json(json!({ "user": user_out(user) }))))
}

/// Partial update: only the fields present in the body are touched, a
/// new password is re-hashed, and `updated_at` is always refreshed.
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ADMIN_ONLY)?;

    let mut user = state
        .db
        .get_user(user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if let Some(username) = req.username {
        user.username = username;
    }
    if let Some(password) = req.password {
        user.password = hash_password(&password)?;
    }
    if let Some(is_active) = req.is_active {
        user.is_active = is_active;
    }
    if let Some(is_admin) = req.is_admin {
        user.is_admin = is_admin;
    }
    user.updated_at = now_utc();

    match state.db.update_user(&user) {
        Ok(()) => {}
        Err(err) if moot_db::is_unique_violation(&err) => {
            return Err(ApiError::conflict("User with this username already exists"));
        }
        Err(err) => return Err(err.into()),
    }

    Ok((StatusCode::CREATED, Json(json!({ "user": user_out(user) }))))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ADMIN_ONLY)?;

    if !state.db.delete_user(user_id)? {
        return Err(ApiError::not_found("User not found"));
    }

    Ok(Json(json!({ "message": "User deleted successfully" })))
}

/// Seed a default administrator on an empty database so the admin-only
/// endpoints are reachable on first run.
pub fn seed_admin(db: &Database) -> anyhow::Result<()> {
    if !db.list_users()?.is_empty() {
        return Ok(());
    }

    let hash = hash_password("admin")?;
    db.create_user("admin", &hash, true, true, &now_utc())?;
    info!("Seeded default admin user 'admin' (password 'admin')");
    Ok(())
}
