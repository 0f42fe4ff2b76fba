use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use corkboard_db::models::{CommentRow, MessageRow, MessageTagRow, ReactionCountRow};
use corkboard_types::api::{CommentView, MessageView, ReactionCounts};

/// Merge message rows with their batch-fetched comments, tags and reaction
/// counts. Message order is preserved; comments keep the order they were
/// fetched in.
pub fn assemble(
    rows: Vec<MessageRow>,
    comments: Vec<CommentRow>,
    tags: Vec<MessageTagRow>,
    reactions: Vec<ReactionCountRow>,
) -> Vec<MessageView> {
    let mut comment_map: HashMap<i64, Vec<CommentView>> = HashMap::new();
    for c in comments {
        comment_map.entry(c.message_id).or_default().push(comment_view(c));
    }

    let mut tag_map: HashMap<i64, Vec<String>> = HashMap::new();
    for t in tags {
        tag_map.entry(t.message_id).or_default().push(t.name);
    }

    let mut reaction_map: HashMap<i64, ReactionCounts> = HashMap::new();
    for r in reactions {
        reaction_map.entry(r.message_id).or_default().insert(r.reaction, r.count);
    }

    rows.into_iter()
        .map(|row| {
            let id = row.id;
            MessageView {
                comments: comment_map.remove(&id).unwrap_or_default(),
                tags: tag_map.remove(&id).unwrap_or_default(),
                reactions: reaction_map.remove(&id).unwrap_or_default(),
                ..message_view(row)
            }
        })
        .collect()
}

/// A message with no comments, tags or reactions attached yet.
pub fn message_view(row: MessageRow) -> MessageView {
    MessageView {
        timestamp: parse_timestamp(&row.created_at, "message", row.id),
        id: row.id,
        content: row.content,
        image_data: row.image_data,
        username: row.author_username,
        avatar: row.author_avatar,
        tags: vec![],
        comments: vec![],
        reactions: ReactionCounts::new(),
    }
}

pub fn comment_view(row: CommentRow) -> CommentView {
    CommentView {
        timestamp: parse_timestamp(&row.created_at, "comment", row.id),
        id: row.id,
        message_id: row.message_id,
        content: row.content,
        username: row.author_username,
        avatar: row.author_avatar,
    }
}

pub fn parse_timestamp(raw: &str, kind: &str, id: impl std::fmt::Display) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by SQLite's datetime('now') have no timezone.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {} '{}': {}", raw, kind, id, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: i64) -> MessageRow {
        MessageRow {
            id,
            author_id: 1,
            author_username: "alice".to_string(),
            author_avatar: "🦀".to_string(),
            content: format!("message {id}"),
            image_data: None,
            created_at: "2024-05-01T12:00:00.000000Z".to_string(),
        }
    }

    fn comment(id: i64, message_id: i64) -> CommentRow {
        CommentRow {
            id,
            message_id,
            author_id: 2,
            author_username: "bob".to_string(),
            author_avatar: "🐙".to_string(),
            content: format!("comment {id}"),
            created_at: "2024-05-01 12:30:00".to_string(),
        }
    }

    #[test]
    fn merges_children_onto_their_messages() {
        let views = assemble(
            vec![message(2), message(1)],
            vec![comment(10, 1), comment(11, 1), comment(12, 2)],
            vec![MessageTagRow {
                message_id: 1,
                name: "rust".to_string(),
            }],
            vec![ReactionCountRow {
                message_id: 2,
                reaction: "👍".to_string(),
                count: 3,
            }],
        );

        assert_eq!(views.len(), 2);
        assert_eq!(views[0].id, 2);
        assert_eq!(views[0].comments.len(), 1);
        assert!(views[0].tags.is_empty());
        assert_eq!(views[0].reactions.get("👍"), Some(&3));

        let ids: Vec<i64> = views[1].comments.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![10, 11]);
        assert_eq!(views[1].tags, vec!["rust".to_string()]);
        assert!(views[1].reactions.is_empty());
    }

    #[test]
    fn parses_both_timestamp_formats() {
        let a = parse_timestamp("2024-05-01T12:00:00.000000Z", "message", 1);
        let b = parse_timestamp("2024-05-01 12:00:00", "message", 1);
        assert_eq!(a, b);

        let bad = parse_timestamp("not a date", "message", 1);
        assert_eq!(bad, DateTime::<Utc>::default());
    }
}
