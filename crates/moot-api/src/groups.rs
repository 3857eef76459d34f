use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use moot_types::api::{
    Claims, CreateGroupRequest, GroupOut, MemberRequest, SearchGroupsRequest, UserOut,
};

use crate::auth::AppState;
use crate::authz::{self, ANY_ROLE};
use crate::convert::{group_out, user_out};
use crate::error::{ApiError, ApiResult};

pub async fn list_groups(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ANY_ROLE)?;

    let groups = state.db.list_groups()?;
    let mut out = Vec::with_capacity(groups.len());
    for group in groups {
        let members = state.db.members(group.id)?;
        out.push(group_out(group, members));
    }

    Ok(Json(json!({ "groups": out })))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ANY_ROLE)?;

    let group = state
        .db
        .get_group(group_id)?
        .ok_or_else(|| ApiError::not_found("Group not found"))?;
    let members = state.db.members(group.id)?;

    Ok(Json(json!({ "group": group_out(group, members) })))
}

/// Name uniqueness comes from the storage constraint, not a pre-check;
/// a racing duplicate still maps to the same response.
pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ANY_ROLE)?;

    let group = match state.db.create_group(&req.name) {
        Ok(group) => group,
        Err(err) if moot_db::is_unique_violation(&err) => {
            return Err(ApiError::bad_request("Group with this name already exists"));
        }
        Err(err) => return Err(err.into()),
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({ "group": group_out(group, vec![]) })),
    ))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ANY_ROLE)?;

    if !state.db.delete_group(group_id)? {
        return Err(ApiError::not_found("Group not found"));
    }

    Ok(Json(json!({ "message": "Group deleted successfully" })))
}

pub async fn search_groups(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SearchGroupsRequest>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ANY_ROLE)?;

    let groups = state.db.search_groups(&req.name)?;
    let mut out: Vec<GroupOut> = Vec::with_capacity(groups.len());
    for group in groups {
        let members = state.db.members(group.id)?;
        out.push(group_out(group, members));
    }

    Ok(Json(json!({ "groups": out })))
}

pub async fn add_member(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MemberRequest>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ANY_ROLE)?;

    let group = state
        .db
        .get_group(group_id)?
        .ok_or_else(|| ApiError::not_found("Group not found"))?;
    state
        .db
        .get_user(req.user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let member_ids = state.db.member_ids(group.id)?;
    if member_ids.contains(&req.user_id) {
        return Err(ApiError::conflict("User is already a member of this group"));
    }

    match state.db.add_member(group.id, req.user_id) {
        Ok(()) => {}
        Err(err) if moot_db::is_unique_violation(&err) => {
            return Err(ApiError::conflict("User is already a member of this group"));
        }
        Err(err) => return Err(err.into()),
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User added to group successfully" })),
    ))
}

/// Membership of the caller is not required to list members, unlike the
/// message endpoints.
pub async fn list_members(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ANY_ROLE)?;

    let group = state
        .db
        .get_group(group_id)?
        .ok_or_else(|| ApiError::not_found("Group not found"))?;
    let members: Vec<UserOut> = state
        .db
        .members(group.id)?
        .into_iter()
        .map(user_out)
        .collect();

    Ok(Json(json!({ "members": members })))
}

/// A target that does not exist and a target that is not a member both
/// read as the same "User not found".
pub async fn remove_member(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MemberRequest>,
) -> ApiResult<impl IntoResponse> {
    authz::require_role(&state, &claims, ANY_ROLE)?;

    let group = state
        .db
        .get_group(group_id)?
        .ok_or_else(|| ApiError::not_found("Group not found"))?;

    let member_ids = state.db.member_ids(group.id)?;
    if !member_ids.contains(&req.user_id) {
        return Err(ApiError::not_found("User not found"));
    }
    state.db.remove_member(group.id, req.user_id)?;

    let members = state.db.members(group.id)?;
    Ok(Json(json!({ "group": group_out(group, members) })))
}
