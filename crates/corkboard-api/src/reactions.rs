use axum::{
    Extension,
    extract::{Path, State},
    response::IntoResponse,
};

use corkboard_types::models::Identity;

use crate::auth::AppState;
use crate::board::blocking;
use crate::error::BoardError;

/// GET /add_reaction/{message_id}/{symbol}: the updated counts go out over
/// the gateway, the caller just gets `OK`.
pub async fn add_reaction(
    State(state): State<AppState>,
    Path((message_id, symbol)): Path<(i64, String)>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, BoardError> {
    blocking(move || state.board.upsert_reaction(message_id, identity.user_id, &symbol)).await?;

    Ok("OK")
}
