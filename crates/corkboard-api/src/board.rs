//! Domain operations of the board.
//!
//! Every write goes to the database first and is published through the
//! injected [`Publisher`] only after it has committed, so a viewer can never
//! see a comment or reaction event for a message it has not been told about.

use std::sync::Arc;

use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::{error, info, warn};

use corkboard_db::Database;
use corkboard_db::models::{MessageRow, UserRow};
use corkboard_types::api::{
    CommentView, FeedPage, MessageView, PopularTag, ProfilePage, PublicUser, ReactionCounts,
};
use corkboard_types::events::{BoardEvent, Publisher};
use corkboard_types::models::User;

use crate::error::BoardError;
use crate::views;

pub const POPULAR_TAG_LIMIT: u32 = 10;
pub const MAX_USERNAME_LEN: usize = 32;
pub const DEFAULT_AVATAR: &str = "👤";

pub struct Board {
    db: Arc<Database>,
    publisher: Arc<dyn Publisher>,
}

impl Board {
    pub fn new(db: Arc<Database>, publisher: Arc<dyn Publisher>) -> Self {
        Self { db, publisher }
    }

    // -- Users --

    pub fn create_user(
        &self,
        username: &str,
        password: &str,
        avatar: Option<&str>,
    ) -> Result<i64, BoardError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(BoardError::InvalidRegistration("Username must not be empty"));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(BoardError::InvalidRegistration("Username is too long"));
        }
        if password.is_empty() {
            return Err(BoardError::InvalidRegistration("Password must not be empty"));
        }
        let avatar = avatar.map(str::trim).filter(|a| !a.is_empty()).unwrap_or(DEFAULT_AVATAR);

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("password hashing failed: {}", e))?
            .to_string();

        let user_id = self
            .db
            .create_user(username, &password_hash, avatar)?
            .ok_or(BoardError::DuplicateUsername)?;

        info!("Registered {} ({})", username, user_id);
        Ok(user_id)
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Result<User, BoardError> {
        let row = self
            .db
            .get_user_by_username(username.trim())?
            .ok_or(BoardError::InvalidCredentials)?;

        let parsed_hash = PasswordHash::new(&row.password).map_err(|e| {
            warn!("Unparseable password hash for {}: {}", row.username, e);
            BoardError::InvalidCredentials
        })?;

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| BoardError::InvalidCredentials)?;

        Ok(user_from_row(row))
    }

    pub fn user_by_id(&self, id: i64) -> Result<Option<User>, BoardError> {
        Ok(self.db.get_user_by_id(id)?.map(user_from_row))
    }

    // -- Writes --

    /// Post a message. Tag names are normalized (trimmed, lowercased) and
    /// deduplicated before they are stored.
    pub fn create_message(
        &self,
        author_id: i64,
        content: &str,
        tags: &[String],
        image_data: Option<&str>,
    ) -> Result<MessageView, BoardError> {
        let image_data = image_data.map(str::trim).filter(|i| !i.is_empty());
        if content.trim().is_empty() && image_data.is_none() {
            return Err(BoardError::EmptyMessage);
        }
        if let Some(image) = image_data {
            B64.decode(image).map_err(|_| BoardError::InvalidImage)?;
        }

        let tags = normalize_tags(tags);
        let message_id = self.db.insert_message(author_id, content, image_data, &tags)?;

        let row = self.fetch_message(message_id)?;
        let view = MessageView {
            tags,
            ..views::message_view(row)
        };

        info!("{} posted message {}", view.username, view.id);
        self.publisher.publish(BoardEvent::MessageCreated(view.clone()));
        Ok(view)
    }

    pub fn create_comment(
        &self,
        author_id: i64,
        message_id: i64,
        content: &str,
    ) -> Result<CommentView, BoardError> {
        if content.trim().is_empty() {
            return Err(BoardError::EmptyContent);
        }

        let comment_id = self
            .db
            .insert_comment(author_id, message_id, content)?
            .ok_or(BoardError::MessageNotFound)?;

        let row = self
            .db
            .get_comment(comment_id)?
            .ok_or_else(|| anyhow!("comment {} vanished after insert", comment_id))?;
        let view = views::comment_view(row);

        info!("{} commented on message {}", view.username, message_id);
        self.publisher.publish(BoardEvent::CommentCreated(view.clone()));
        Ok(view)
    }

    /// Record `symbol` for (message, user). Idempotent: repeating the call
    /// leaves the counts unchanged, though the update is published again.
    pub fn upsert_reaction(
        &self,
        message_id: i64,
        user_id: i64,
        symbol: &str,
    ) -> Result<ReactionCounts, BoardError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(BoardError::EmptyContent);
        }

        let reactions = self
            .db
            .upsert_reaction(message_id, user_id, symbol)?
            .ok_or(BoardError::MessageNotFound)?;

        self.publisher.publish(BoardEvent::ReactionUpdated {
            message_id,
            reactions: reactions.clone(),
        });
        Ok(reactions)
    }

    // -- Reads --

    pub fn feed(&self) -> Result<FeedPage, BoardError> {
        Ok(FeedPage {
            messages: self.list_feed()?,
            popular_tags: self.popular_tags()?,
            current_tag: None,
        })
    }

    pub fn tag_page(&self, tag: &str) -> Result<FeedPage, BoardError> {
        let tag = normalize_tag(tag);
        Ok(FeedPage {
            messages: self.list_messages_by_tag(&tag)?,
            popular_tags: vec![],
            current_tag: Some(tag),
        })
    }

    pub fn profile(&self, username: &str) -> Result<ProfilePage, BoardError> {
        let row = self
            .db
            .get_user_by_username(username)?
            .ok_or(BoardError::UserNotFound)?;
        let user = user_from_row(row);

        Ok(ProfilePage {
            messages: self.list_messages_by_user(user.id)?,
            user: PublicUser {
                username: user.username,
                avatar: user.avatar,
            },
        })
    }

    pub fn list_feed(&self) -> Result<Vec<MessageView>, BoardError> {
        let rows = self.db.get_feed()?;
        self.assemble(rows)
    }

    pub fn list_messages_by_tag(&self, tag: &str) -> Result<Vec<MessageView>, BoardError> {
        let rows = self.db.get_messages_by_tag(&normalize_tag(tag))?;
        self.assemble(rows)
    }

    pub fn list_messages_by_user(&self, user_id: i64) -> Result<Vec<MessageView>, BoardError> {
        let rows = self.db.get_messages_by_author(user_id)?;
        self.assemble(rows)
    }

    /// The ten most used tags. Order among equally used tags is not
    /// guaranteed.
    pub fn popular_tags(&self) -> Result<Vec<PopularTag>, BoardError> {
        Ok(self
            .db
            .popular_tags(POPULAR_TAG_LIMIT)?
            .into_iter()
            .map(|t| PopularTag {
                name: t.name,
                count: t.count,
            })
            .collect())
    }

    fn fetch_message(&self, id: i64) -> Result<MessageRow, BoardError> {
        Ok(self
            .db
            .get_message(id)?
            .ok_or_else(|| anyhow!("message {} vanished after insert", id))?)
    }

    fn assemble(&self, rows: Vec<MessageRow>) -> Result<Vec<MessageView>, BoardError> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let comments = self.db.get_comments_for_messages(&ids)?;
        let tags = self.db.get_tags_for_messages(&ids)?;
        let reactions = self.db.get_reaction_counts_for_messages(&ids)?;
        Ok(views::assemble(rows, comments, tags, reactions))
    }
}

/// Split a comma-separated tag field. Blank entries are dropped later by
/// normalization.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',').map(str::to_string).collect()
}

pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// Normalize, drop blanks and deduplicate, keeping first-seen order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = normalize_tag(tag);
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Run a blocking board call off the async runtime.
pub async fn blocking<F, T>(f: F) -> Result<T, BoardError>
where
    F: FnOnce() -> Result<T, BoardError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        BoardError::Internal(anyhow!("blocking task failed: {}", e))
    })?
}

fn user_from_row(row: UserRow) -> User {
    User {
        created_at: row
            .created_at
            .as_deref()
            .map(|raw| views::parse_timestamp(raw, "user", row.id)),
        id: row.id,
        username: row.username,
        avatar: row.avatar,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<BoardEvent>>,
    }

    impl Publisher for Recorder {
        fn publish(&self, event: BoardEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl Recorder {
        fn kinds(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
        }
    }

    fn board() -> (Board, Arc<Recorder>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let recorder = Arc::new(Recorder::default());
        (Board::new(db, recorder.clone()), recorder)
    }

    #[test]
    fn duplicate_username_fails_and_keeps_first() {
        let (board, _) = board();
        let first = board.create_user("alice", "hunter2", Some("🦀")).unwrap();

        let err = board.create_user("alice", "other", None).unwrap_err();
        assert!(matches!(err, BoardError::DuplicateUsername));

        let user = board.authenticate("alice", "hunter2").unwrap();
        assert_eq!(user.id, first);
        assert_eq!(user.avatar, "🦀");
    }

    #[test]
    fn password_is_stored_hashed() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let board = Board::new(db.clone(), Arc::new(Recorder::default()));
        board.create_user("alice", "hunter2", None).unwrap();

        let row = db.get_user_by_username("alice").unwrap().unwrap();
        assert_ne!(row.password, "hunter2");
        assert!(row.password.starts_with("$argon2"));
        assert_eq!(row.avatar, DEFAULT_AVATAR);
    }

    #[test]
    fn registration_rejects_blank_fields() {
        let (board, _) = board();
        assert!(matches!(
            board.create_user("   ", "pw", None),
            Err(BoardError::InvalidRegistration(_))
        ));
        assert!(matches!(
            board.create_user("alice", "", None),
            Err(BoardError::InvalidRegistration(_))
        ));
    }

    #[test]
    fn authenticate_rejects_bad_credentials() {
        let (board, _) = board();
        board.create_user("alice", "hunter2", None).unwrap();

        assert!(matches!(
            board.authenticate("alice", "wrong"),
            Err(BoardError::InvalidCredentials)
        ));
        assert!(matches!(
            board.authenticate("nobody", "hunter2"),
            Err(BoardError::InvalidCredentials)
        ));
    }

    #[test]
    fn accounts_with_foreign_hashes_cannot_log_in() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let board = Board::new(db.clone(), Arc::new(Recorder::default()));
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, password, avatar) VALUES ('old', 'pbkdf2:sha256:600000$salt$hash', NULL)",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(
            board.authenticate("old", "whatever"),
            Err(BoardError::InvalidCredentials)
        ));

        let profile = board.profile("old").unwrap();
        assert_eq!(profile.user.avatar, DEFAULT_AVATAR);
    }

    #[test]
    fn empty_message_is_rejected_and_feed_unchanged() {
        let (board, recorder) = board();
        let alice = board.create_user("alice", "pw", None).unwrap();

        let err = board.create_message(alice, "   ", &[], None).unwrap_err();
        assert!(matches!(err, BoardError::EmptyMessage));
        let err = board.create_message(alice, "", &[], Some("")).unwrap_err();
        assert!(matches!(err, BoardError::EmptyMessage));

        assert!(board.list_feed().unwrap().is_empty());
        assert!(recorder.kinds().is_empty());
    }

    #[test]
    fn image_only_message_is_accepted() {
        let (board, _) = board();
        let alice = board.create_user("alice", "pw", None).unwrap();
        let png = B64.encode(b"\x89PNG\r\n\x1a\nfake");

        let view = board.create_message(alice, "", &[], Some(&png)).unwrap();
        assert_eq!(view.image_data.as_deref(), Some(png.as_str()));

        let err = board.create_message(alice, "", &[], Some("not base64!")).unwrap_err();
        assert!(matches!(err, BoardError::InvalidImage));
    }

    #[test]
    fn tags_are_normalized_and_deduplicated() {
        let (board, _) = board();
        let alice = board.create_user("alice", "pw", None).unwrap();

        let view = board
            .create_message(alice, "hello", &split_tags("Foo, foo, BAR"), None)
            .unwrap();
        assert_eq!(view.tags, vec!["foo".to_string(), "bar".to_string()]);

        let feed = board.list_feed().unwrap();
        assert_eq!(feed[0].tags, vec!["foo".to_string(), "bar".to_string()]);

        let popular = board.popular_tags().unwrap();
        assert_eq!(popular.len(), 2);
        assert!(popular.iter().all(|t| t.count == 1));

        assert_eq!(board.list_messages_by_tag("  FOO ").unwrap().len(), 1);
    }

    #[test]
    fn reacting_twice_counts_once() {
        let (board, recorder) = board();
        let alice = board.create_user("alice", "pw", None).unwrap();
        let msg = board.create_message(alice, "hi", &[], None).unwrap();

        board.upsert_reaction(msg.id, alice, "👍").unwrap();
        let counts = board.upsert_reaction(msg.id, alice, "👍").unwrap();
        assert_eq!(counts.get("👍"), Some(&1));

        let feed = board.list_feed().unwrap();
        assert_eq!(feed[0].reactions.get("👍"), Some(&1));
        assert_eq!(
            recorder.kinds(),
            vec!["message-created", "reaction-updated", "reaction-updated"]
        );
    }

    #[test]
    fn reaction_on_missing_message_fails() {
        let (board, recorder) = board();
        let alice = board.create_user("alice", "pw", None).unwrap();

        assert!(matches!(
            board.upsert_reaction(99, alice, "👍"),
            Err(BoardError::MessageNotFound)
        ));
        assert!(recorder.kinds().is_empty());
    }

    #[test]
    fn comment_on_missing_message_fails() {
        let (board, recorder) = board();
        let alice = board.create_user("alice", "pw", None).unwrap();

        let err = board.create_comment(alice, 12345, "hello").unwrap_err();
        assert!(matches!(err, BoardError::MessageNotFound));

        let msg = board.create_message(alice, "hi", &[], None).unwrap();
        let err = board.create_comment(alice, msg.id, "  ").unwrap_err();
        assert!(matches!(err, BoardError::EmptyContent));
        assert_eq!(recorder.kinds(), vec!["message-created"]);
    }

    #[test]
    fn writes_publish_in_causal_order() {
        let (board, recorder) = board();
        let alice = board.create_user("alice", "pw", Some("🦀")).unwrap();

        let msg = board
            .create_message(alice, "hello", &split_tags("rust"), None)
            .unwrap();
        let comment = board.create_comment(alice, msg.id, "first!").unwrap();
        board.upsert_reaction(msg.id, alice, "❤️").unwrap();

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 3);
        match &events[0] {
            BoardEvent::MessageCreated(m) => {
                assert_eq!(m.id, msg.id);
                assert_eq!(m.username, "alice");
                assert_eq!(m.avatar, "🦀");
                assert_eq!(m.tags, vec!["rust".to_string()]);
                assert!(m.reactions.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(events[1], BoardEvent::CommentCreated(comment));
        match &events[2] {
            BoardEvent::ReactionUpdated {
                message_id,
                reactions,
            } => {
                assert_eq!(*message_id, msg.id);
                assert_eq!(reactions.get("❤️"), Some(&1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn feed_aggregates_comments_tags_and_reactions() {
        let (board, _) = board();
        let alice = board.create_user("alice", "pw", None).unwrap();
        let bob = board.create_user("bob", "pw", None).unwrap();

        let older = board.create_message(alice, "older", &split_tags("a"), None).unwrap();
        let newer = board.create_message(bob, "newer", &[], None).unwrap();
        board.create_comment(bob, older.id, "one").unwrap();
        board.create_comment(alice, older.id, "two").unwrap();
        board.upsert_reaction(older.id, alice, "👍").unwrap();
        board.upsert_reaction(older.id, bob, "👍").unwrap();

        let page = board.feed().unwrap();
        let ids: Vec<i64> = page.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);

        let older_view = &page.messages[1];
        let comments: Vec<&str> = older_view.comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(comments, vec!["one", "two"]);
        assert_eq!(older_view.reactions.get("👍"), Some(&2));
        assert_eq!(page.popular_tags[0].name, "a");

        let profile = board.profile("bob").unwrap();
        assert_eq!(profile.user.username, "bob");
        assert_eq!(profile.messages.len(), 1);
        assert!(matches!(board.profile("carol"), Err(BoardError::UserNotFound)));
    }

    #[test]
    fn popular_tags_cap_at_ten() {
        let (board, _) = board();
        let alice = board.create_user("alice", "pw", None).unwrap();
        for i in 0..11 {
            for _ in 0..=i {
                board
                    .create_message(alice, "x", &[format!("Tag{i}")], None)
                    .unwrap();
            }
        }

        let popular = board.popular_tags().unwrap();
        assert_eq!(popular.len(), 10);
        assert_eq!(popular[0].name, "tag10");
        assert!(popular.windows(2).all(|w| w[0].count >= w[1].count));
    }
}
