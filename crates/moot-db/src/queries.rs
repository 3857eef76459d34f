use crate::Database;
use crate::models::{GroupRow, LikeRow, MessageRow, UserRow};
use anyhow::{Result, anyhow};
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        is_active: bool,
        is_admin: bool,
        now: &str,
    ) -> Result<UserRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, password, is_active, is_admin, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![username, password_hash, is_active, is_admin, now],
            )?;
            let id = conn.last_insert_rowid();
            query_user_by_id(conn, id)?.ok_or_else(|| anyhow!("user {} vanished after insert", id))
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {USER_COLS} FROM users ORDER BY id"))?;
            let rows = stmt
                .query_map([], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {USER_COLS} FROM users WHERE username = ?1"))?;
            let row = stmt.query_row([username], map_user).optional()?;
            Ok(row)
        })
    }

    /// Full-row write-back; callers load, patch and hand the row back.
    pub fn update_user(&self, user: &UserRow) -> Result<()> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users
                 SET username = ?2, password = ?3, is_active = ?4, is_admin = ?5, updated_at = ?6
                 WHERE id = ?1",
                rusqlite::params![
                    user.id,
                    user.username,
                    user.password,
                    user.is_active,
                    user.is_admin,
                    user.updated_at
                ],
            )?;
            if n == 0 {
                return Err(anyhow!("user {} not found", user.id));
            }
            Ok(())
        })
    }

    pub fn delete_user(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    // -- Groups --

    pub fn create_group(&self, name: &str) -> Result<GroupRow> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO groups (name) VALUES (?1)", [name])?;
            let id = conn.last_insert_rowid();
            query_group_by_id(conn, id)?.ok_or_else(|| anyhow!("group {} vanished after insert", id))
        })
    }

    pub fn list_groups(&self) -> Result<Vec<GroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM groups ORDER BY id")?;
            let rows = stmt
                .query_map([], map_group)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_group(&self, id: i64) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| query_group_by_id(conn, id))
    }

    pub fn delete_group(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM groups WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    /// Case-insensitive substring match on the group name.
    pub fn search_groups(&self, fragment: &str) -> Result<Vec<GroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name FROM groups WHERE name LIKE '%' || ?1 || '%' ORDER BY id",
            )?;
            let rows = stmt
                .query_map([fragment], map_group)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Membership --

    pub fn add_member(&self, group_id: i64, user_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO group_members (user_id, group_id) VALUES (?1, ?2)",
                [user_id, group_id],
            )?;
            Ok(())
        })
    }

    pub fn remove_member(&self, group_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM group_members WHERE user_id = ?1 AND group_id = ?2",
                [user_id, group_id],
            )?;
            Ok(n > 0)
        })
    }

    pub fn member_ids(&self, group_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM group_members WHERE group_id = ?1 ORDER BY rowid",
            )?;
            let ids = stmt
                .query_map([group_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Member rows in join order, for serialization.
    pub fn members(&self, group_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLS_QUALIFIED}
                 FROM group_members gm
                 JOIN users u ON u.id = gm.user_id
                 WHERE gm.group_id = ?1
                 ORDER BY gm.rowid"
            ))?;
            let rows = stmt
                .query_map([group_id], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        text: &str,
        user_id: i64,
        group_id: i64,
        timestamp: &str,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (text, user_id, group_id, timestamp) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![text, user_id, group_id, timestamp],
            )?;
            let id = conn.last_insert_rowid();
            query_message(conn, group_id, id)?
                .ok_or_else(|| anyhow!("message {} vanished after insert", id))
        })
    }

    /// Most recent first; equal timestamps fall back to insertion order.
    pub fn messages_for_group(&self, group_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, text, user_id, group_id, timestamp FROM messages
                 WHERE group_id = ?1
                 ORDER BY timestamp DESC, id",
            )?;
            let rows = stmt
                .query_map([group_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Lookup scoped to the group so a message id from another group
    /// reads as absent.
    pub fn get_message(&self, group_id: i64, message_id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, group_id, message_id))
    }

    /// Case-insensitive substring match on message text, most recent first.
    pub fn search_messages(&self, group_id: i64, fragment: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, text, user_id, group_id, timestamp FROM messages
                 WHERE group_id = ?1 AND text LIKE '%' || ?2 || '%'
                 ORDER BY timestamp DESC, id",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![group_id, fragment], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Text is the only mutable field; the timestamp stays as posted.
    pub fn update_message_text(&self, message_id: i64, text: &str) -> Result<()> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE messages SET text = ?2 WHERE id = ?1",
                rusqlite::params![message_id, text],
            )?;
            if n == 0 {
                return Err(anyhow!("message {} not found", message_id));
            }
            Ok(())
        })
    }

    pub fn delete_message(&self, message_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM messages WHERE id = ?1", [message_id])?;
            Ok(n > 0)
        })
    }

    // -- Likes --

    pub fn insert_like(&self, user_id: i64, message_id: i64) -> Result<LikeRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO likes (user_id, message_id) VALUES (?1, ?2)",
                [user_id, message_id],
            )?;
            let id = conn.last_insert_rowid();
            let row = conn
                .query_row(
                    "SELECT id, user_id, message_id FROM likes WHERE id = ?1",
                    [id],
                    map_like,
                )
                .optional()?;
            row.ok_or_else(|| anyhow!("like {} vanished after insert", id))
        })
    }

    pub fn find_like(&self, user_id: i64, message_id: i64) -> Result<Option<LikeRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, message_id FROM likes
                     WHERE user_id = ?1 AND message_id = ?2",
                    [user_id, message_id],
                    map_like,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn delete_like(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM likes WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    pub fn likes_for_message(&self, message_id: i64) -> Result<Vec<LikeRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, message_id FROM likes WHERE message_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([message_id], map_like)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch likes for a set of message ids (one query, no N+1).
    pub fn likes_for_messages(&self, message_ids: &[i64]) -> Result<Vec<LikeRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, user_id, message_id FROM likes WHERE message_id IN ({}) ORDER BY id",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), map_like)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

const USER_COLS: &str = "id, username, password, is_active, is_admin, created_at, updated_at";
const USER_COLS_QUALIFIED: &str =
    "u.id, u.username, u.password, u.is_active, u.is_admin, u.created_at, u.updated_at";

fn map_user(row: &rusqlite::Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        is_active: row.get(3)?,
        is_admin: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn map_group(row: &rusqlite::Row) -> rusqlite::Result<GroupRow> {
    Ok(GroupRow {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn map_message(row: &rusqlite::Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        text: row.get(1)?,
        user_id: row.get(2)?,
        group_id: row.get(3)?,
        timestamp: row.get(4)?,
    })
}

fn map_like(row: &rusqlite::Row) -> rusqlite::Result<LikeRow> {
    Ok(LikeRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        message_id: row.get(2)?,
    })
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLS} FROM users WHERE id = ?1"))?;
    let row = stmt.query_row([id], map_user).optional()?;
    Ok(row)
}

fn query_group_by_id(conn: &Connection, id: i64) -> Result<Option<GroupRow>> {
    let mut stmt = conn.prepare("SELECT id, name FROM groups WHERE id = ?1")?;
    let row = stmt.query_row([id], map_group).optional()?;
    Ok(row)
}

fn query_message(conn: &Connection, group_id: i64, message_id: i64) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, text, user_id, group_id, timestamp FROM messages
         WHERE id = ?1 AND group_id = ?2",
    )?;
    let row = stmt
        .query_row([message_id, group_id], map_message)
        .optional()?;
    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, is_unique_violation};

    const T0: &str = "2026-01-01T00:00:00.000000Z";
    const T1: &str = "2026-01-01T00:00:01.000000Z";
    const T2: &str = "2026-01-01T00:00:02.000000Z";

    fn db() -> Database {
        Database::open_in_memory().expect("in-memory db")
    }

    fn seed_user(db: &Database, name: &str) -> i64 {
        db.create_user(name, "hash", true, false, T0).expect("user").id
    }

    #[test]
    fn test_username_unique() {
        let db = db();
        seed_user(&db, "alice");
        let err = db.create_user("alice", "hash", true, false, T0).unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn test_group_name_unique() {
        let db = db();
        db.create_group("general").expect("group");
        let err = db.create_group("general").unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn test_membership_pair_unique() {
        let db = db();
        let user = seed_user(&db, "alice");
        let group = db.create_group("general").expect("group").id;

        db.add_member(group, user).expect("first add");
        let err = db.add_member(group, user).unwrap_err();
        assert!(is_unique_violation(&err));
        assert_eq!(db.member_ids(group).expect("members"), vec![user]);
    }

    #[test]
    fn test_like_pair_unique() {
        let db = db();
        let author = seed_user(&db, "alice");
        let liker = seed_user(&db, "bob");
        let group = db.create_group("general").expect("group").id;
        let message = db.insert_message("hi", author, group, T0).expect("message");

        db.insert_like(liker, message.id).expect("first like");
        let err = db.insert_like(liker, message.id).unwrap_err();
        assert!(is_unique_violation(&err));
        assert_eq!(db.likes_for_message(message.id).expect("likes").len(), 1);
    }

    #[test]
    fn test_message_ordering_descending_with_insertion_tiebreak() {
        let db = db();
        let user = seed_user(&db, "alice");
        let group = db.create_group("general").expect("group").id;

        let m_old = db.insert_message("old", user, group, T0).expect("m");
        let m_tie_a = db.insert_message("tie a", user, group, T1).expect("m");
        let m_tie_b = db.insert_message("tie b", user, group, T1).expect("m");
        let m_new = db.insert_message("new", user, group, T2).expect("m");

        let ids: Vec<i64> = db
            .messages_for_group(group)
            .expect("list")
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![m_new.id, m_tie_a.id, m_tie_b.id, m_old.id]);
    }

    #[test]
    fn test_message_lookup_scoped_to_group() {
        let db = db();
        let user = seed_user(&db, "alice");
        let g1 = db.create_group("one").expect("group").id;
        let g2 = db.create_group("two").expect("group").id;
        let message = db.insert_message("hi", user, g1, T0).expect("message");

        assert!(db.get_message(g1, message.id).expect("get").is_some());
        assert!(db.get_message(g2, message.id).expect("get").is_none());
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let db = db();
        let user = seed_user(&db, "alice");
        let group = db.create_group("General Chat").expect("group").id;
        db.insert_message("Hello World", user, group, T0).expect("message");

        assert_eq!(db.search_groups("general").expect("groups").len(), 1);
        assert_eq!(db.search_messages(group, "hello").expect("messages").len(), 1);
        assert_eq!(db.search_messages(group, "nope").expect("messages").len(), 0);
    }

    #[test]
    fn test_group_delete_cascades() {
        let db = db();
        let author = seed_user(&db, "alice");
        let liker = seed_user(&db, "bob");
        let group = db.create_group("general").expect("group").id;
        db.add_member(group, author).expect("member");
        let message = db.insert_message("hi", author, group, T0).expect("message");
        db.insert_like(liker, message.id).expect("like");

        assert!(db.delete_group(group).expect("delete"));

        assert!(db.get_group(group).expect("get").is_none());
        assert!(db.member_ids(group).expect("members").is_empty());
        assert!(db.get_message(group, message.id).expect("get").is_none());
        assert!(db.find_like(liker, message.id).expect("find").is_none());
    }

    #[test]
    fn test_user_delete_cascades() {
        let db = db();
        let author = seed_user(&db, "alice");
        let liker = seed_user(&db, "bob");
        let group = db.create_group("general").expect("group").id;
        db.add_member(group, author).expect("member");
        let message = db.insert_message("hi", author, group, T0).expect("message");
        db.insert_like(liker, message.id).expect("like");

        assert!(db.delete_user(author).expect("delete"));

        assert!(db.member_ids(group).expect("members").is_empty());
        assert!(db.get_message(group, message.id).expect("get").is_none());
        assert!(db.find_like(liker, message.id).expect("find").is_none());

        // the liker's rows go the same way
        let message = db.insert_message("again", liker, group, T1).expect("message");
        assert!(db.delete_user(liker).expect("delete"));
        assert!(db.get_message(group, message.id).expect("get").is_none());
    }

    #[test]
    fn test_update_user_partial_patch_roundtrip() {
        let db = db();
        let id = seed_user(&db, "alice");
        let mut user = db.get_user(id).expect("get").expect("row");

        user.is_active = false;
        user.updated_at = T1.into();
        db.update_user(&user).expect("update");

        let reread = db.get_user(id).expect("get").expect("row");
        assert!(!reread.is_active);
        assert_eq!(reread.username, "alice");
        assert_eq!(reread.created_at, T0);
        assert_eq!(reread.updated_at, T1);
    }
}
