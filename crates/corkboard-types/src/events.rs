use serde::{Deserialize, Serialize};

use crate::api::{CommentView, MessageView, ReactionCounts};

/// Events pushed to every viewer over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum BoardEvent {
    /// A message was posted. Carries tags and an empty reaction map.
    MessageCreated(MessageView),

    /// A comment was posted on `message_id`.
    CommentCreated(CommentView),

    /// The reaction counts of a message changed.
    ReactionUpdated {
        message_id: i64,
        reactions: ReactionCounts,
    },
}

impl BoardEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageCreated(_) => "message-created",
            Self::CommentCreated(_) => "comment-created",
            Self::ReactionUpdated { .. } => "reaction-updated",
        }
    }

    /// The message this event belongs to.
    pub fn message_id(&self) -> i64 {
        match self {
            Self::MessageCreated(m) => m.id,
            Self::CommentCreated(c) => c.message_id,
            Self::ReactionUpdated { message_id, .. } => *message_id,
        }
    }
}

/// Sink for board events. The domain layer calls `publish` once a write has
/// committed; implementations must not block or fail the caller.
pub trait Publisher: Send + Sync {
    fn publish(&self, event: BoardEvent);
}
