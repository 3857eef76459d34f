use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::auth::{self, AppState};
use crate::groups;
use crate::messages;
use crate::middleware::require_auth;
use crate::users;

/// Assemble the full router: `/login` is public, everything else sits
/// behind the bearer middleware.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/login", post(auth::login))
        .with_state(state.clone());

    let protected = Router::new()
        .route("/logout", post(auth::logout))
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/{user_id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/groups", get(groups::list_groups).post(groups::create_group))
        .route("/groups/search", post(groups::search_groups))
        .route(
            "/groups/{group_id}",
            get(groups::get_group).delete(groups::delete_group),
        )
        .route(
            "/groups/{group_id}/members",
            get(groups::list_members).post(groups::add_member),
        )
        .route("/groups/{group_id}/remove_member", post(groups::remove_member))
        .route(
            "/groups/{group_id}/messages",
            get(messages::list_messages).post(messages::post_message),
        )
        .route(
            "/groups/{group_id}/messages/search",
            post(messages::search_messages),
        )
        .route(
            "/groups/{group_id}/messages/{message_id}",
            get(messages::get_message)
                .put(messages::edit_message)
                .delete(messages::delete_message),
        )
        .route(
            "/groups/{group_id}/messages/{message_id}/like",
            post(messages::like_message).delete(messages::unlike_message),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public).merge(protected)
}
