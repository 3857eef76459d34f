use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use moot_db::models::{GroupRow, LikeRow, MessageRow};
use moot_types::api::{
    Claims, EditMessageRequest, MessageOut, PostMessageRequest, SearchMessagesRequest,
};

use crate::auth::AppState;
use crate::authz::{self, ANY_ROLE};
use crate::convert::{message_out, now_utc};
use crate::error::{ApiError, ApiResult};

fn load_group(state: &AppState, group_id: i64) -> ApiResult<GroupRow> {
    state
        .db
        .get_group(group_id)?
        .ok_or_else(|| ApiError::not_found("Group not found"))
}

/// Pair each message with its likes, preserving row order.
fn attach_likes(rows: Vec<MessageRow>, likes: Vec<LikeRow>) -> Vec<MessageOut> {
    let mut by_message: HashMap<i64, Vec<LikeRow>> = HashMap::new();
    for like in likes {
        by_message.entry(like.message_id).or_default().push(like);
    }

    rows.into_iter()
        .map(|row| {
            let likes = by_message.remove(&row.id).unwrap_or_default();
            message_out(row, likes)
        })
        .collect()
}

pub async fn post_message(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PostMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ANY_ROLE)?;

    let group = load_group(&state, group_id)?;
    let member_ids = state.db.member_ids(group.id)?;
    authz::require_member(&member_ids, claims.sub, "post")?;

    let message = state
        .db
        .insert_message(&req.text, claims.sub, group.id, &now_utc())?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": message_out(message, vec![]) })),
    ))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ANY_ROLE)?;

    let group = load_group(&state, group_id)?;
    let member_ids = state.db.member_ids(group.id)?;
    authz::require_member(&member_ids, claims.sub, "view")?;

    // Run the unbounded reads off the async runtime
    let db = state.clone();
    let gid = group.id;
    let (rows, like_rows) = tokio::task::spawn_blocking(move || {
        let rows = db.db.messages_for_group(gid)?;
        let ids: Vec<i64> = rows.iter().map(|m| m.id).collect();
        let like_rows = db.db.likes_for_messages(&ids)?;
        Ok::<_, anyhow::Error>((rows, like_rows))
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    let messages = attach_likes(rows, like_rows);
    let total = messages.len();
    Ok(Json(json!({ "messages": messages, "total": total })))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path((group_id, message_id)): Path<(i64, i64)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ANY_ROLE)?;

    let group = load_group(&state, group_id)?;
    let member_ids = state.db.member_ids(group.id)?;
    authz::require_member(&member_ids, claims.sub, "view")?;

    let message = state
        .db
        .get_message(group.id, message_id)?
        .ok_or_else(|| ApiError::not_found("Message not found."))?;
    let likes = state.db.likes_for_message(message.id)?;

    Ok(Json(json!({ "message": message_out(message, likes) })))
}

pub async fn search_messages(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SearchMessagesRequest>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ANY_ROLE)?;

    let group = load_group(&state, group_id)?;
    let member_ids = state.db.member_ids(group.id)?;
    authz::require_member(&member_ids, claims.sub, "post")?;

    let db = state.clone();
    let gid = group.id;
    let (rows, like_rows) = tokio::task::spawn_blocking(move || {
        let rows = db.db.search_messages(gid, &req.query)?;
        let ids: Vec<i64> = rows.iter().map(|m| m.id).collect();
        let like_rows = db.db.likes_for_messages(&ids)?;
        Ok::<_, anyhow::Error>((rows, like_rows))
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    let messages = attach_likes(rows, like_rows);
    let total = messages.len();
    Ok(Json(json!({ "messages": messages, "total": total })))
}

/// Edit checks group existence and authorship but not membership, and
/// leaves the timestamp as posted.
pub async fn edit_message(
    State(state): State<AppState>,
    Path((group_id, message_id)): Path<(i64, i64)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ANY_ROLE)?;

    let group = load_group(&state, group_id)?;
    let mut message = state
        .db
        .get_message(group.id, message_id)?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;
    authz::require_author(&message, claims.sub, "edit")?;

    state.db.update_message_text(message.id, &req.text)?;
    message.text = req.text;
    let likes = state.db.likes_for_message(message.id)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": message_out(message, likes) })),
    ))
}

/// Same checks as edit; the message's likes go with it.
pub async fn delete_message(
    State(state): State<AppState>,
    Path((group_id, message_id)): Path<(i64, i64)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ANY_ROLE)?;

    let group = load_group(&state, group_id)?;
    let message = state
        .db
        .get_message(group.id, message_id)?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;
    authz::require_author(&message, claims.sub, "delete")?;

    state.db.delete_message(message.id)?;

    Ok(Json(json!({ "message": "Message deleted successfully" })))
}

/// At most one like per (user, message); authors cannot like their own
/// message. The UNIQUE constraint backs the pre-check under races.
pub async fn like_message(
    State(state): State<AppState>,
    Path((group_id, message_id)): Path<(i64, i64)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ANY_ROLE)?;

    let group = load_group(&state, group_id)?;
    let message = state
        .db
        .get_message(group.id, message_id)?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;

    if message.user_id == claims.sub {
        return Err(ApiError::bad_request("Cannot like your own message"));
    }
    if state.db.find_like(claims.sub, message.id)?.is_some() {
        return Err(ApiError::bad_request("Already liked this message"));
    }

    match state.db.insert_like(claims.sub, message.id) {
        Ok(_) => {}
        Err(err) if moot_db::is_unique_violation(&err) => {
            return Err(ApiError::bad_request("Already liked this message"));
        }
        Err(err) => return Err(err.into()),
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Liked successfully" })),
    ))
}

pub async fn unlike_message(
    State(state): State<AppState>,
    Path((group_id, message_id)): Path<(i64, i64)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ANY_ROLE)?;

    let group = load_group(&state, group_id)?;
    let message = state
        .db
        .get_message(group.id, message_id)?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;

    let like = state
        .db
        .find_like(claims.sub, message.id)?
        .ok_or_else(|| ApiError::bad_request("You have not liked this message"))?;
    state.db.delete_like(like.id)?;

    Ok(Json(json!({ "message": "Unliked successfully" })))
}
