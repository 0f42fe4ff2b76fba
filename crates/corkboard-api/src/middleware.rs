use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use corkboard_types::models::Identity;

use crate::auth::{AppState, SESSION_COOKIE, decode_token};
use crate::board::blocking;
use crate::error::BoardError;

/// Resolve the session (cookie, or `Authorization: Bearer` for scripted
/// clients) into an [`Identity`] request extension. Requests without a valid
/// session for an existing user are redirected to the login page.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, BoardError> {
    let token = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| {
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string)
        })
        .ok_or(BoardError::Unauthenticated)?;

    let claims = decode_token(&state.jwt_secret, &token).ok_or(BoardError::Unauthenticated)?;

    let user_id = claims.sub;
    let lookup = state.clone();
    let user = blocking(move || lookup.board.user_by_id(user_id))
        .await?
        .ok_or_else(|| {
            debug!("Session for unknown user {}", user_id);
            BoardError::Unauthenticated
        })?;

    req.extensions_mut().insert(Identity {
        user_id: user.id,
        username: user.username,
        avatar: user.avatar,
    });
    Ok(next.run(req).await)
}
