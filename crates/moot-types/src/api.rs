use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- JWT Claims --

/// JWT claims shared between token issuance in the login handler and the
/// bearer middleware. Canonical definition lives here in moot-types to
/// eliminate duplication.
///
/// The payload captures the account state at login time; membership and
/// ownership checks compare against `sub` for the token's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub exp: usize,
}

// -- Auth --

/// Fields are optional so a missing one maps to the contracted 400
/// instead of a deserialization rejection.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_admin: bool,
}

fn default_true() -> bool {
    true
}

/// Partial update: absent fields leave the stored values untouched.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
}

/// The password column is write-only and never serialized.
#[derive(Debug, Serialize)]
pub struct UserOut {
    pub id: i64,
    pub username: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Groups --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchGroupsRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemberRequest {
    pub user_id: i64,
}

/// No creator is tracked post-creation, so there is no `created_by` key.
#[derive(Debug, Serialize)]
pub struct GroupOut {
    pub id: i64,
    pub name: String,
    pub members: Vec<UserOut>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostMessageRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditMessageRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchMessagesRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct MessageOut {
    pub id: i64,
    pub text: String,
    pub user_id: i64,
    pub group_id: i64,
    pub timestamp: DateTime<Utc>,
    pub likes: Vec<LikeOut>,
}

#[derive(Debug, Serialize)]
pub struct LikeOut {
    pub id: i64,
    pub user_id: i64,
    pub message_id: i64,
}
