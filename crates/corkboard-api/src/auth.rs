use std::sync::Arc;

use axum::{
    Form,
    extract::State,
    response::{Html, IntoResponse, Redirect},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;

use corkboard_types::api::{Claims, LoginForm, RegisterForm};
use corkboard_types::models::User;

use crate::board::{Board, blocking};
use crate::error::BoardError;
use crate::images::ImageClient;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub board: Board,
    pub images: ImageClient,
    pub jwt_secret: String,
}

pub const SESSION_COOKIE: &str = "corkboard_session";
const SESSION_DAYS: i64 = 30;

const LOGIN_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>Login</title></head>
<body>
    <h1>Login</h1>
    <form method="post" action="/login">
        <input type="text" name="username" placeholder="Username" required>
        <input type="password" name="password" placeholder="Password" required>
        <button type="submit">Login</button>
    </form>
    <p>No account? <a href="/register">Register</a></p>
</body>
</html>
"#;

const REGISTER_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>Register</title></head>
<body>
    <h1>Register</h1>
    <form method="post" action="/register">
        <input type="text" name="username" placeholder="Username" required>
        <input type="password" name="password" placeholder="Password" required>
        <input type="text" name="avatar" placeholder="Avatar (emoji)" maxlength="8">
        <button type="submit">Register</button>
    </form>
    <p>Already registered? <a href="/login">Login</a></p>
</body>
</html>
"#;

pub async fn login_page() -> Html<&'static str> {
    Html(LOGIN_HTML)
}

pub async fn register_page() -> Html<&'static str> {
    Html(REGISTER_HTML)
}

/// POST /register: create the account, then send the user to the login form.
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<impl IntoResponse, BoardError> {
    blocking(move || {
        state
            .board
            .create_user(&form.username, &form.password, form.avatar.as_deref())
    })
    .await?;

    Ok(Redirect::to("/login"))
}

/// POST /login: verify credentials and set the session cookie.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<impl IntoResponse, BoardError> {
    let board_state = state.clone();
    let user = blocking(move || board_state.board.authenticate(&form.username, &form.password)).await?;

    let token = create_token(&state.jwt_secret, &user)?;
    info!("{} ({}) logged in", user.username, user.id);

    Ok((jar.add(session_cookie(token)), Redirect::to("/")))
}

/// GET /logout: drop the session cookie.
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Redirect::to("/"),
    )
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

pub fn create_token(secret: &str, user: &User) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        avatar: user.avatar.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate a session token. Returns `None` for anything malformed, expired
/// or signed with a different secret.
pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
