use std::collections::HashSet;

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Columns added after the first release. Older databases get them through
/// `ALTER TABLE`; fresh ones already have them from `CREATE TABLE`. SQLite
/// only accepts constant defaults here.
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[
    ("users", "created_at", "TEXT"),
    ("messages", "image_data", "TEXT"),
];

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            avatar      TEXT,
            created_at  TEXT
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER REFERENCES users(id),
            content     TEXT NOT NULL,
            timestamp   DATETIME DEFAULT CURRENT_TIMESTAMP,
            image_data  TEXT
        );

        CREATE TABLE IF NOT EXISTS comments (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER REFERENCES users(id),
            message_id  INTEGER REFERENCES messages(id),
            content     TEXT NOT NULL,
            timestamp   DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS tags (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS message_tags (
            message_id  INTEGER REFERENCES messages(id),
            tag_id      INTEGER REFERENCES tags(id),
            PRIMARY KEY (message_id, tag_id)
        );

        CREATE TABLE IF NOT EXISTS reactions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id  INTEGER REFERENCES messages(id),
            user_id     INTEGER REFERENCES users(id),
            reaction    TEXT,
            UNIQUE(message_id, user_id, reaction)
        );
        ",
    )?;

    for (table, column, decl) in ADDED_COLUMNS {
        ensure_column(conn, table, column, decl)?;
    }

    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_messages_timestamp
            ON messages(timestamp);

        CREATE INDEX IF NOT EXISTS idx_messages_user
            ON messages(user_id, timestamp);

        CREATE INDEX IF NOT EXISTS idx_comments_message
            ON comments(message_id, timestamp);

        CREATE INDEX IF NOT EXISTS idx_message_tags_tag
            ON message_tags(tag_id);

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let existing = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;

    if !existing.contains(column) {
        conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"), [])?;
        info!("Added column {}.{}", table, column);
    }
    Ok(())
}
