use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Cascades are the schema's responsibility: deleting a group takes its
/// messages, their likes and its membership rows with it; deleting a user
/// takes their memberships, messages and likes.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            is_active   INTEGER NOT NULL DEFAULT 0,
            is_admin    INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS groups (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS group_members (
            user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            group_id    INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            UNIQUE(user_id, group_id)
        );

        CREATE INDEX IF NOT EXISTS idx_group_members_group
            ON group_members(group_id);

        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            text        TEXT NOT NULL,
            user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            group_id    INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            timestamp   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_group
            ON messages(group_id, timestamp);

        CREATE TABLE IF NOT EXISTS likes (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            UNIQUE(user_id, message_id)
        );

        CREATE INDEX IF NOT EXISTS idx_likes_message
            ON likes(message_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
