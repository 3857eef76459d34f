/// Database row types — these map directly to SQLite rows.
/// Distinct from moot-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct GroupRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub text: String,
    pub user_id: i64,
    pub group_id: i64,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct LikeRow {
    pub id: i64,
    pub user_id: i64,
    pub message_id: i64,
}
