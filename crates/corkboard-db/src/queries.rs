use crate::models::{CommentRow, MessageRow, MessageTagRow, ReactionCountRow, TagCountRow, UserRow};
use crate::Database;
use anyhow::Result;
use corkboard_types::api::ReactionCounts;
use rusqlite::{Connection, Row, ToSql, params, params_from_iter};

const MESSAGE_COLUMNS: &str =
    "m.id, m.user_id, u.username, COALESCE(u.avatar, '👤'), m.content, m.image_data, COALESCE(m.timestamp, '')";

const COMMENT_COLUMNS: &str =
    "c.id, c.message_id, c.user_id, u.username, COALESCE(u.avatar, '👤'), c.content, COALESCE(c.timestamp, '')";

/// Fixed-width UTC timestamp, so lexical order in SQLite is chronological order.
pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

impl Database {
    // -- Users --

    /// Insert a user and return its id, or `None` when the username is
    /// already taken.
    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        avatar: &str,
    ) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, password, avatar, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(username) DO NOTHING",
                params![username, password_hash, avatar, now_timestamp()],
            )?;
            Ok((inserted == 1).then(|| conn.last_insert_rowid()))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", &username))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id))
    }

    // -- Messages --

    /// Insert a message and link its (already normalized, deduplicated) tags
    /// in one transaction. Returns the new message id.
    pub fn insert_message(
        &self,
        author_id: i64,
        content: &str,
        image_data: Option<&str>,
        tags: &[String],
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO messages (user_id, content, image_data, timestamp)
                 VALUES (?1, ?2, ?3, MAX(?4, COALESCE((SELECT MAX(timestamp) FROM messages), '')))",
                params![author_id, content, image_data, now_timestamp()],
            )?;
            let message_id = tx.last_insert_rowid();

            for tag in tags {
                tx.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", [tag])?;
                let tag_id: i64 =
                    tx.query_row("SELECT id FROM tags WHERE name = ?1", [tag], |row| row.get(0))?;
                tx.execute(
                    "INSERT OR IGNORE INTO message_tags (message_id, tag_id) VALUES (?1, ?2)",
                    params![message_id, tag_id],
                )?;
            }

            tx.commit()?;
            Ok(message_id)
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m
                 JOIN users u ON m.user_id = u.id
                 WHERE m.id = ?1"
            );
            conn.query_row(&sql, [id], map_message).optional()
        })
    }

    /// Every message, newest first.
    pub fn get_feed(&self) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m
                 JOIN users u ON m.user_id = u.id
                 ORDER BY m.timestamp DESC, m.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Messages linked to the (normalized) tag name, newest first.
    pub fn get_messages_by_tag(&self, tag: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m
                 JOIN users u ON m.user_id = u.id
                 JOIN message_tags mt ON mt.message_id = m.id
                 JOIN tags t ON t.id = mt.tag_id
                 WHERE t.name = ?1
                 ORDER BY m.timestamp DESC, m.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([tag], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_messages_by_author(&self, author_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m
                 JOIN users u ON m.user_id = u.id
                 WHERE m.user_id = ?1
                 ORDER BY m.timestamp DESC, m.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([author_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Comments --

    /// Insert a comment. Returns `None` if the parent message does not exist.
    pub fn insert_comment(
        &self,
        author_id: i64,
        message_id: i64,
        content: &str,
    ) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if !message_exists(&tx, message_id)? {
                return Ok(None);
            }

            tx.execute(
                "INSERT INTO comments (user_id, message_id, content, timestamp)
                 VALUES (?1, ?2, ?3, MAX(?4, COALESCE((SELECT MAX(timestamp) FROM comments), '')))",
                params![author_id, message_id, content, now_timestamp()],
            )?;
            let comment_id = tx.last_insert_rowid();

            tx.commit()?;
            Ok(Some(comment_id))
        })
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {COMMENT_COLUMNS}
                 FROM comments c
                 JOIN users u ON c.user_id = u.id
                 WHERE c.id = ?1"
            );
            conn.query_row(&sql, [id], map_comment).optional()
        })
    }

    /// Batch-fetch comments for a set of message IDs, oldest first.
    pub fn get_comments_for_messages(&self, message_ids: &[i64]) -> Result<Vec<CommentRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {COMMENT_COLUMNS}
                 FROM comments c
                 JOIN users u ON c.user_id = u.id
                 WHERE c.message_id IN ({})
                 ORDER BY c.timestamp ASC, c.id ASC",
                placeholders(message_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(message_ids), map_comment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Tags --

    /// Batch-fetch tag names for a set of message IDs, in the order they
    /// were attached.
    pub fn get_tags_for_messages(&self, message_ids: &[i64]) -> Result<Vec<MessageTagRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT mt.message_id, t.name
                 FROM message_tags mt
                 JOIN tags t ON t.id = mt.tag_id
                 WHERE mt.message_id IN ({})
                 ORDER BY mt.message_id, mt.rowid",
                placeholders(message_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(message_ids), |row| {
                    Ok(MessageTagRow {
                        message_id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Tags ranked by the number of distinct messages linked to them.
    /// Equal counts fall back to tag creation order.
    pub fn popular_tags(&self, limit: u32) -> Result<Vec<TagCountRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.name, COUNT(DISTINCT mt.message_id) AS tag_count
                 FROM tags t
                 JOIN message_tags mt ON t.id = mt.tag_id
                 GROUP BY t.id
                 ORDER BY tag_count DESC, t.id ASC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(TagCountRow {
                        name: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Reactions --

    /// Record a reaction. Re-submitting the same (message, user, reaction)
    /// triple leaves a single row. Returns the message's updated counts, or
    /// `None` if the message does not exist.
    pub fn upsert_reaction(
        &self,
        message_id: i64,
        user_id: i64,
        reaction: &str,
    ) -> Result<Option<ReactionCounts>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if !message_exists(&tx, message_id)? {
                return Ok(None);
            }

            tx.execute(
                "INSERT INTO reactions (message_id, user_id, reaction) VALUES (?1, ?2, ?3)
                 ON CONFLICT(message_id, user_id, reaction) DO UPDATE SET reaction = excluded.reaction",
                params![message_id, user_id, reaction],
            )?;
            let counts = query_reaction_counts(&tx, message_id)?;

            tx.commit()?;
            Ok(Some(counts))
        })
    }

    pub fn get_reaction_counts(&self, message_id: i64) -> Result<ReactionCounts> {
        self.with_conn(|conn| query_reaction_counts(conn, message_id))
    }

    /// Batch-fetch per-symbol reaction counts for a set of message IDs.
    pub fn get_reaction_counts_for_messages(
        &self,
        message_ids: &[i64],
    ) -> Result<Vec<ReactionCountRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT message_id, reaction, COUNT(*)
                 FROM reactions
                 WHERE message_id IN ({}) AND reaction IS NOT NULL
                 GROUP BY message_id, reaction",
                placeholders(message_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(message_ids), |row| {
                    Ok(ReactionCountRow {
                        message_id: row.get(0)?,
                        reaction: row.get(1)?,
                        count: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &dyn ToSql) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, password, COALESCE(avatar, '👤'), created_at
         FROM users WHERE {column} = ?1"
    );
    conn.query_row(&sql, [value], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            username: row.get(1)?,
            password: row.get(2)?,
            avatar: row.get(3)?,
            created_at: row.get(4)?,
        })
    })
    .optional()
}

fn message_exists(conn: &Connection, message_id: i64) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM messages WHERE id = ?1", [message_id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn query_reaction_counts(conn: &Connection, message_id: i64) -> Result<ReactionCounts> {
    let mut stmt = conn.prepare(
        "SELECT reaction, COUNT(*) FROM reactions
         WHERE message_id = ?1 AND reaction IS NOT NULL
         GROUP BY reaction",
    )?;
    let counts = stmt
        .query_map([message_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<std::result::Result<ReactionCounts, _>>()?;
    Ok(counts)
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        author_username: row.get(2)?,
        author_avatar: row.get(3)?,
        content: row.get(4)?,
        image_data: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_comment(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        message_id: row.get(1)?,
        author_id: row.get(2)?,
        author_username: row.get(3)?,
        author_avatar: row.get(4)?,
        content: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
