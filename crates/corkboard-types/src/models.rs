use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub avatar: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// The authenticated caller of a request. Inserted into request extensions
/// by the auth middleware and passed explicitly into domain operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
    pub avatar: String,
}
