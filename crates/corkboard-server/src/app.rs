use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use corkboard_api::auth::{self, AppState, AppStateInner};
use corkboard_api::board::Board;
use corkboard_api::images::{self, ImageClient};
use corkboard_api::messages;
use corkboard_api::middleware::require_auth;
use corkboard_api::reactions;
use corkboard_db::Database;
use corkboard_gateway::connection;
use corkboard_gateway::dispatcher::Dispatcher;

use crate::config::Config;

/// Wire the database, dispatcher and image client into shared app state.
pub fn build_state(config: &Config, db: Database) -> anyhow::Result<(AppState, Dispatcher)> {
    let dispatcher = Dispatcher::new();
    let board = Board::new(Arc::new(db), Arc::new(dispatcher.clone()));
    let images = ImageClient::new(config.images.clone())?;

    let state: AppState = Arc::new(AppStateInner {
        board,
        images,
        jwt_secret: config.jwt_secret.clone(),
    });
    Ok((state, dispatcher))
}

pub fn router(app_state: AppState, dispatcher: Dispatcher, max_body_bytes: usize) -> Router {
    let public_routes = Router::new()
        .route("/", get(messages::index))
        .route("/tag/{name}", get(messages::view_tag))
        .route("/profile/{username}", get(messages::profile))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", get(auth::logout))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/post_message", post(messages::post_message))
        .route("/generate_image", post(images::generate_image))
        .route("/post_comment/{message_id}", post(messages::post_comment))
        .route("/add_reaction/{message_id}/{symbol}", get(reactions::add_reaction))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let gateway_routes = Router::new()
        .route("/gateway", get(ws_upgrade))
        .route("/health", get(health))
        .with_state(dispatcher);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(gateway_routes)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(dispatcher): State<Dispatcher>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher))
}

async fn health(State(dispatcher): State<Dispatcher>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "viewers": dispatcher.viewer_count() }))
}
