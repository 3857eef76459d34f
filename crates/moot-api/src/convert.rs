use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use moot_db::models::{GroupRow, LikeRow, MessageRow, UserRow};
use moot_types::api::{GroupOut, LikeOut, MessageOut, UserOut};

/// Timestamps are stored as RFC 3339 UTC text with microsecond
/// precision, so lexicographic order in SQL is chronological order.
pub(crate) fn now_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub(crate) fn user_out(row: UserRow) -> UserOut {
    UserOut {
        id: row.id,
        username: row.username,
        is_active: row.is_active,
        is_admin: row.is_admin,
        created_at: parse_ts(&row.created_at),
        updated_at: parse_ts(&row.updated_at),
    }
}

pub(crate) fn group_out(row: GroupRow, members: Vec<UserRow>) -> GroupOut {
    GroupOut {
        id: row.id,
        name: row.name,
        members: members.into_iter().map(user_out).collect(),
    }
}

pub(crate) fn like_out(row: LikeRow) -> LikeOut {
    LikeOut {
        id: row.id,
        user_id: row.user_id,
        message_id: row.message_id,
    }
}

pub(crate) fn message_out(row: MessageRow, likes: Vec<LikeRow>) -> MessageOut {
    MessageOut {
        id: row.id,
        text: row.text,
        user_id: row.user_id,
        group_id: row.group_id,
        timestamp: parse_ts(&row.timestamp),
        likes: likes.into_iter().map(like_out).collect(),
    }
}
