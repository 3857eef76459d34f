use moot_db::models::{MessageRow, UserRow};
use moot_types::api::Claims;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// Role is derived from the admin flag, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn of(user: &UserRow) -> Role {
        if user.is_admin { Role::Admin } else { Role::User }
    }
}

pub const ANY_ROLE: &[Role] = &[Role::Admin, Role::User];
pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// Role and active-flag enforcement re-reads the user row by the token's
/// id; the membership and ownership predicates below compare against the
/// claims captured at login instead. Role is checked before the active
/// flag.
pub fn require_role(state: &AppState, claims: &Claims, allowed: &[Role]) -> ApiResult<UserRow> {
    let user = state
        .db
        .get_user(claims.sub)?
        .ok_or_else(|| ApiError::unauthorized("Invalid token"))?;

    if !allowed.contains(&Role::of(&user)) {
        return Err(ApiError::forbidden("You do not have the required role"));
    }
    if !user.is_active {
        return Err(ApiError::unauthorized("User is disabled"));
    }
    Ok(user)
}

/// Not-a-member reads as Unauthorized, not Forbidden. `verb` names the
/// denied action in the error string ("post" or "view").
pub fn require_member(member_ids: &[i64], user_id: i64, verb: &str) -> ApiResult<()> {
    if member_ids.contains(&user_id) {
        return Ok(());
    }
    Err(ApiError::unauthorized(format!(
        "You must be a member of the group to {verb} messages"
    )))
}

/// Only the author may edit or delete a message, regardless of role.
pub fn require_author(message: &MessageRow, user_id: i64, verb: &str) -> ApiResult<()> {
    if message.user_id == user_id {
        return Ok(());
    }
    Err(ApiError::unauthorized(format!(
        "You are not authorized to {verb} this message"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(user_id: i64) -> MessageRow {
        MessageRow {
            id: 1,
            text: "hi".into(),
            user_id,
            group_id: 1,
            timestamp: "2026-01-01T00:00:00.000000Z".into(),
        }
    }

    #[test]
    fn test_role_of_is_pure_over_flags() {
        let mut user = UserRow {
            id: 1,
            username: "alice".into(),
            password: "hash".into(),
            is_active: true,
            is_admin: false,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(Role::of(&user), Role::User);
        user.is_admin = true;
        assert_eq!(Role::of(&user), Role::Admin);
    }

    #[test]
    fn test_membership_denial_names_the_action() {
        let err = require_member(&[1, 2], 3, "view").unwrap_err();
        assert_eq!(
            err.to_string(),
            "You must be a member of the group to view messages"
        );
        assert!(require_member(&[1, 2], 2, "post").is_ok());
    }

    #[test]
    fn test_authorship_denial_names_the_action() {
        let err = require_author(&message(1), 2, "delete").unwrap_err();
        assert_eq!(err.to_string(), "You are not authorized to delete this message");
        assert!(require_author(&message(1), 1, "edit").is_ok());
    }
}
