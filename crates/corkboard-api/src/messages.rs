use axum::{
    Extension, Form, Json,
    extract::{Path, State},
    response::{IntoResponse, Redirect},
};

use corkboard_types::api::{FeedPage, PostCommentForm, PostMessageForm, ProfilePage};
use corkboard_types::models::Identity;

use crate::auth::AppState;
use crate::board::{blocking, split_tags};
use crate::error::BoardError;

/// GET /: the whole feed plus the most popular tags.
pub async fn index(State(state): State<AppState>) -> Result<Json<FeedPage>, BoardError> {
    let page = blocking(move || state.board.feed()).await?;
    Ok(Json(page))
}

/// GET /tag/{name}
pub async fn view_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<FeedPage>, BoardError> {
    let page = blocking(move || state.board.tag_page(&tag)).await?;
    Ok(Json(page))
}

/// GET /profile/{username}
pub async fn profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<ProfilePage>, BoardError> {
    let page = blocking(move || state.board.profile(&username)).await?;
    Ok(Json(page))
}

/// POST /post_message: viewers learn about the message through the
/// gateway; the poster is sent back to the feed.
pub async fn post_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Form(form): Form<PostMessageForm>,
) -> Result<impl IntoResponse, BoardError> {
    let tags = split_tags(form.tags.as_deref().unwrap_or_default());
    blocking(move || {
        state.board.create_message(
            identity.user_id,
            form.content.as_deref().unwrap_or_default(),
            &tags,
            form.image_data.as_deref(),
        )
    })
    .await?;

    Ok(Redirect::to("/"))
}

/// POST /post_comment/{message_id}
pub async fn post_comment(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(identity): Extension<Identity>,
    Form(form): Form<PostCommentForm>,
) -> Result<impl IntoResponse, BoardError> {
    blocking(move || {
        state.board.create_comment(
            identity.user_id,
            message_id,
            form.content.as_deref().unwrap_or_default(),
        )
    })
    .await?;

    Ok(Redirect::to("/"))
}
