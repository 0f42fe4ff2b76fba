/// Database row types. These map directly to SQLite rows.
/// Distinct from corkboard-types view models to keep the DB layer independent.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub avatar: String,
    /// Accounts from before signup dates were recorded have none.
    pub created_at: Option<String>,
}

/// A message joined with its author.
pub struct MessageRow {
    pub id: i64,
    pub author_id: i64,
    pub author_username: String,
    pub author_avatar: String,
    pub content: String,
    pub image_data: Option<String>,
    pub created_at: String,
}

/// A comment joined with its author.
pub struct CommentRow {
    pub id: i64,
    pub message_id: i64,
    pub author_id: i64,
    pub author_username: String,
    pub author_avatar: String,
    pub content: String,
    pub created_at: String,
}

pub struct MessageTagRow {
    pub message_id: i64,
    pub name: String,
}

pub struct ReactionCountRow {
    pub message_id: i64,
    pub reaction: String,
    pub count: i64,
}

pub struct TagCountRow {
    pub name: String,
    pub count: i64,
}
