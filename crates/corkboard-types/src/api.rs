use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reaction symbol -> number of users who reacted with it.
pub type ReactionCounts = BTreeMap<String, i64>;

// -- Session claims --

/// JWT claims carried in the session cookie. Shared by the login handler
/// (encoding) and the auth middleware (decoding).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub avatar: String,
    pub exp: usize,
}

// -- Auth forms --

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

// -- Posting --

#[derive(Debug, Default, Deserialize)]
pub struct PostMessageForm {
    #[serde(default)]
    pub content: Option<String>,
    /// Comma-separated tag names.
    #[serde(default)]
    pub tags: Option<String>,
    /// Pre-encoded base64 PNG, usually produced by `/generate_image`.
    #[serde(default)]
    pub image_data: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PostCommentForm {
    #[serde(default)]
    pub content: Option<String>,
}

// -- Image generation --

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateImageForm {
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
}

fn default_aspect_ratio() -> String {
    "1:1".to_string()
}

fn default_dimension() -> u32 {
    512
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateImageResponse {
    pub image_data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// -- Views --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentView {
    pub id: i64,
    pub message_id: i64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub avatar: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: i64,
    pub content: String,
    pub image_data: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub avatar: String,
    pub tags: Vec<String>,
    pub comments: Vec<CommentView>,
    pub reactions: ReactionCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularTag {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedPage {
    pub messages: Vec<MessageView>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub popular_tags: Vec<PopularTag>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub current_tag: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicUser {
    pub username: String,
    pub avatar: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfilePage {
    pub user: PublicUser,
    pub messages: Vec<MessageView>,
}
