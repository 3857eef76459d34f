use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;

use moot_db::Database;
use moot_db::models::UserRow;
use moot_types::api::{Claims, LoginRequest};

use crate::convert::user_out;
use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(username), Some(password)) = (req.username, req.password) else {
        return Err(ApiError::bad_request("Username and password are required"));
    };
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("Username and password are required"));
    }

    let user = state
        .db
        .get_user_by_username(&username)?
        .ok_or_else(|| ApiError::unauthorized("Invalid username or password"))?;

    verify_password(&user.password, &password)
        .map_err(|_| ApiError::unauthorized("Invalid username or password"))?;

    let token = create_token(&state.jwt_secret, &user)?;

    Ok(Json(json!({ "access_token": token, "user": user_out(user) })))
}

pub async fn logout() -> impl IntoResponse {
    // Tokens are invalidated client-side; there is no server-side blacklist.
    Json(json!({ "message": "Successfully logged out" }))
}

/// Hash a password with Argon2id and a fresh salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(stored: &str, password: &str) -> anyhow::Result<()> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| anyhow::anyhow!("stored password hash unreadable: {}", e))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|e| anyhow::anyhow!("password verification failed: {}", e))?;
    Ok(())
}

/// The claims embed the account state as of login; they are trusted
/// verbatim for the token's lifetime.
pub fn create_token(secret: &str, user: &UserRow) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        is_active: user.is_active,
        is_admin: user.is_admin,
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
