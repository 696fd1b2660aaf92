//! Database repository for CRUD operations.
//!
//! Every committed write bumps the revision counter and announces the touched
//! collection on the change channel.

use chrono::Utc;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::broadcast;

use super::{Collection, Subscription};
use crate::errors::AppError;
use crate::models::{
    format_timestamp, parse_timestamp, ActivityEntry, ChatMessage, CouncilAssignment,
    CreateEventRequest, Event, NewMessage, NewUser, UpdateEventRequest, UpdateProfileRequest,
    User, WriteTimestamp,
};

const USER_COLUMNS: &str = "id, name, email, photo_url, is_admin, is_council_member, council_role, council_department, description, created_at";
const MESSAGE_COLUMNS: &str = "id, text, user, avatar_url, timestamp, client_timestamp, image_url";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    changes: broadcast::Sender<Collection>,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self { pool, changes }
    }

    /// Receiver for collection change notices.
    pub fn changes(&self) -> broadcast::Receiver<Collection> {
        self.changes.subscribe()
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Bump the revision inside `tx` and commit. Subscribers hear about the
    /// change only once the commit has succeeded.
    async fn commit_change(
        &self,
        mut tx: Transaction<'_, Sqlite>,
        collection: Collection,
    ) -> Result<i64, AppError> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(
            "UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1 RETURNING revision_id",
        )
        .bind(&now)
        .fetch_one(&mut *tx)
        .await?;
        let revision_id: i64 = row.get("revision_id");

        tx.commit().await?;

        self.announce(collection);
        Ok(revision_id)
    }

    /// Wake every subscription on `collection`.
    pub(crate) fn announce(&self, collection: Collection) {
        // No receivers just means nobody is subscribed right now.
        let _ = self.changes.send(collection);
    }

    // ==================== SUBSCRIPTIONS ====================

    pub async fn subscribe_users(&self) -> Result<Subscription<User>, AppError> {
        Subscription::open(self, Collection::Users, |repo| async move {
            repo.list_users().await
        })
        .await
    }

    pub async fn subscribe_events(&self) -> Result<Subscription<Event>, AppError> {
        Subscription::open(self, Collection::Events, |repo| async move {
            repo.list_events().await
        })
        .await
    }

    /// Messages in ascending server-timestamp order.
    pub async fn subscribe_messages(&self) -> Result<Subscription<ChatMessage>, AppError> {
        Subscription::open(self, Collection::Messages, |repo| async move {
            repo.list_messages().await
        })
        .await
    }

    // ==================== USER OPERATIONS ====================

    /// List all users.
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY name"))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(user_from_row).collect())
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Create the user record on first sign-in; later sign-ins only refresh
    /// the admin flag. Returns the record and whether it was created.
    pub async fn ensure_user(&self, new_user: &NewUser) -> Result<(User, bool), AppError> {
        if let Some(mut existing) = self.get_user(&new_user.id).await? {
            if existing.is_admin != new_user.is_admin {
                let mut tx = self.pool.begin().await?;
                sqlx::query("UPDATE users SET is_admin = ? WHERE id = ?")
                    .bind(new_user.is_admin as i32)
                    .bind(&new_user.id)
                    .execute(&mut *tx)
                    .await?;
                self.commit_change(tx, Collection::Users).await?;
                existing.is_admin = new_user.is_admin;
            }
            return Ok((existing, false));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO users (id, name, email, photo_url, is_admin, is_council_member, created_at) VALUES (?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&new_user.id)
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.photo_url)
        .bind(new_user.is_admin as i32)
        .bind(format_timestamp(now))
        .execute(&mut *tx)
        .await?;

        self.commit_change(tx, Collection::Users).await?;

        Ok((
            User {
                id: new_user.id.clone(),
                name: new_user.name.clone(),
                email: new_user.email.clone(),
                photo_url: new_user.photo_url.clone(),
                is_admin: new_user.is_admin,
                is_council_member: false,
                council_role: None,
                council_department: None,
                description: None,
                created_at: Some(now),
            },
            true,
        ))
    }

    /// Apply a profile edit.
    pub async fn update_profile(
        &self,
        id: &str,
        request: &UpdateProfileRequest,
    ) -> Result<User, AppError> {
        let existing = self
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

        let name = request.name.clone().unwrap_or(existing.name.clone());
        let photo_url = request.photo_url.clone().unwrap_or(existing.photo_url.clone());
        let description = request.description.clone().or(existing.description.clone());

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE users SET name = ?, photo_url = ?, description = ? WHERE id = ?")
            .bind(&name)
            .bind(&photo_url)
            .bind(&description)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        self.commit_change(tx, Collection::Users).await?;

        Ok(User {
            name,
            photo_url,
            description,
            ..existing
        })
    }

    /// Assign a user to the council, or remove them with `None`.
    pub async fn set_council_membership(
        &self,
        id: &str,
        assignment: Option<&CouncilAssignment>,
    ) -> Result<User, AppError> {
        let existing = self
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

        let role = assignment.map(|a| a.council_role.clone());
        let department = assignment.map(|a| a.council_department.clone());

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE users SET is_council_member = ?, council_role = ?, council_department = ? WHERE id = ?",
        )
        .bind(assignment.is_some() as i32)
        .bind(&role)
        .bind(&department)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        self.commit_change(tx, Collection::Users).await?;

        Ok(User {
            is_council_member: assignment.is_some(),
            council_role: role,
            council_department: department,
            ..existing
        })
    }

    // ==================== EVENT OPERATIONS ====================

    /// List all events, soonest first. Undated events come last.
    pub async fn list_events(&self) -> Result<Vec<Event>, AppError> {
        let rows = sqlx::query(
            "SELECT id, title, description, date, link FROM events ORDER BY date IS NULL, date, title",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(event_from_row).collect())
    }

    /// Get an event by ID.
    pub async fn get_event(&self, id: &str) -> Result<Option<Event>, AppError> {
        let row = sqlx::query("SELECT id, title, description, date, link FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(event_from_row))
    }

    /// Create a new event.
    pub async fn create_event(&self, request: &CreateEventRequest) -> Result<Event, AppError> {
        let id = uuid::Uuid::new_v4().to_string();

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO events (id, title, description, date, link) VALUES (?, ?, ?, ?, ?)")
            .bind(&id)
            .bind(&request.title)
            .bind(&request.description)
            .bind(format_timestamp(request.date))
            .bind(&request.link)
            .execute(&mut *tx)
            .await?;

        self.commit_change(tx, Collection::Events).await?;

        Ok(Event {
            id,
            title: request.title.clone(),
            description: request.description.clone(),
            date: Some(request.date),
            link: request.link.clone(),
        })
    }

    /// Update an event.
    pub async fn update_event(
        &self,
        id: &str,
        request: &UpdateEventRequest,
    ) -> Result<Event, AppError> {
        let existing = self
            .get_event(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", id)))?;

        let title = request.title.clone().unwrap_or(existing.title);
        let description = request.description.clone().unwrap_or(existing.description);
        let date = request.date.or(existing.date);
        let link = request.link.clone().or(existing.link);

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE events SET title = ?, description = ?, date = ?, link = ? WHERE id = ?")
            .bind(&title)
            .bind(&description)
            .bind(date.map(format_timestamp))
            .bind(&link)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        self.commit_change(tx, Collection::Events).await?;

        Ok(Event {
            id: id.to_string(),
            title,
            description,
            date,
            link,
        })
    }

    /// Delete an event.
    pub async fn delete_event(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Event {} not found", id)));
        }

        self.commit_change(tx, Collection::Events).await?;
        Ok(())
    }

    // ==================== MESSAGE OPERATIONS ====================

    /// List all messages by ascending server timestamp, pending ones last.
    pub async fn list_messages(&self) -> Result<Vec<ChatMessage>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY timestamp IS NULL, timestamp, client_timestamp, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(message_from_row).collect())
    }

    /// Append a message. A `WriteTimestamp::Server` placeholder takes the
    /// store's clock at commit.
    pub async fn add_message(&self, message: &NewMessage) -> Result<ChatMessage, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let timestamp = match message.timestamp {
            WriteTimestamp::Server => Some(Utc::now()),
            WriteTimestamp::At(ts) => Some(ts),
            WriteTimestamp::Null => None,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&id)
        .bind(&message.text)
        .bind(&message.user)
        .bind(&message.avatar_url)
        .bind(timestamp.map(format_timestamp))
        .bind(message.client_timestamp.map(format_timestamp))
        .bind(&message.image_url)
        .execute(&mut *tx)
        .await?;

        self.commit_change(tx, Collection::Messages).await?;

        Ok(ChatMessage {
            id,
            text: message.text.clone(),
            user: message.user.clone(),
            avatar_url: message.avatar_url.clone(),
            timestamp,
            client_timestamp: message.client_timestamp,
            image_url: message.image_url.clone(),
        })
    }

    // ==================== ACTIVITY OPERATIONS ====================

    /// Append an activity log entry.
    pub async fn add_activity(
        &self,
        user_id: &str,
        action: &str,
        detail: &str,
    ) -> Result<ActivityEntry, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO activity (id, user_id, action, detail, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(action)
        .bind(detail)
        .bind(format_timestamp(now))
        .execute(&mut *tx)
        .await?;

        self.commit_change(tx, Collection::Activity).await?;

        Ok(ActivityEntry {
            id,
            user_id: user_id.to_string(),
            action: action.to_string(),
            detail: detail.to_string(),
            created_at: now,
        })
    }

    /// Most recent activity first.
    pub async fn list_activity(&self, limit: i64) -> Result<Vec<ActivityEntry>, AppError> {
        let rows = sqlx::query(
            "SELECT id, user_id, action, detail, created_at FROM activity ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let created_at: String = row.get("created_at");
                Some(ActivityEntry {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    action: row.get("action"),
                    detail: row.get("detail"),
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect())
    }
}

// Helper functions for row conversion

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> User {
    let is_admin: i32 = row.get("is_admin");
    let is_council_member: i32 = row.get("is_council_member");
    let created_at: Option<String> = row.get("created_at");
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        photo_url: row.get("photo_url"),
        is_admin: is_admin != 0,
        is_council_member: is_council_member != 0,
        council_role: row.get("council_role"),
        council_department: row.get("council_department"),
        description: row.get("description"),
        created_at: created_at.as_deref().and_then(parse_timestamp),
    }
}

fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Event {
    let date: Option<String> = row.get("date");
    Event {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        date: date.as_deref().and_then(parse_timestamp),
        link: row.get("link"),
    }
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> ChatMessage {
    let timestamp: Option<String> = row.get("timestamp");
    let client_timestamp: Option<String> = row.get("client_timestamp");
    ChatMessage {
        id: row.get("id"),
        text: row.get("text"),
        user: row.get("user"),
        avatar_url: row.get("avatar_url"),
        timestamp: timestamp.as_deref().and_then(parse_timestamp),
        client_timestamp: client_timestamp.as_deref().and_then(parse_timestamp),
        image_url: row.get("image_url"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    async fn repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        (Repository::new(pool), temp_dir)
    }

    fn message(text: &str, timestamp: WriteTimestamp) -> NewMessage {
        NewMessage {
            text: text.to_string(),
            user: "Tux".to_string(),
            avatar_url: "https://placehold.co/40x40.png".to_string(),
            timestamp,
            client_timestamp: Some(Utc::now()),
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_server_timestamp_is_resolved_on_commit() {
        let (repo, _dir) = repo().await;
        let before = Utc::now();
        let stored = repo
            .add_message(&message("hello", WriteTimestamp::Server))
            .await
            .unwrap();
        let ts = stored.timestamp.expect("server timestamp assigned");
        assert!(ts >= before);

        let listed = repo.list_messages().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, stored.id);
    }

    #[tokio::test]
    async fn test_messages_listed_pending_last() {
        let (repo, _dir) = repo().await;
        let pending = repo
            .add_message(&message("pending", WriteTimestamp::Null))
            .await
            .unwrap();
        let later = repo
            .add_message(&message("later", WriteTimestamp::Server))
            .await
            .unwrap();
        let earlier_ts = later.timestamp.unwrap() - chrono::Duration::seconds(10);
        let earlier = repo
            .add_message(&message("earlier", WriteTimestamp::At(earlier_ts)))
            .await
            .unwrap();

        let ids: Vec<String> = repo
            .list_messages()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![earlier.id, later.id, pending.id]);
    }

    #[tokio::test]
    async fn test_ensure_user_creates_once() {
        let (repo, _dir) = repo().await;
        let new_user = NewUser {
            id: "uid-1".into(),
            name: "Ada".into(),
            email: "ada@dubai.bits-pilani.ac.in".into(),
            photo_url: String::new(),
            is_admin: false,
        };

        let (user, created) = repo.ensure_user(&new_user).await.unwrap();
        assert!(created);
        assert!(user.created_at.is_some());

        let (again, created_again) = repo.ensure_user(&new_user).await.unwrap();
        assert!(!created_again);
        assert_eq!(again.created_at, user.created_at);
        assert_eq!(repo.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_council_membership_round_trip() {
        let (repo, _dir) = repo().await;
        let (user, _) = repo
            .ensure_user(&NewUser {
                id: "uid-2".into(),
                name: "Linus".into(),
                email: "linus@dubai.bits-pilani.ac.in".into(),
                photo_url: String::new(),
                is_admin: false,
            })
            .await
            .unwrap();

        let assignment = CouncilAssignment {
            council_role: "President".into(),
            council_department: "Core".into(),
        };
        let updated = repo
            .set_council_membership(&user.id, Some(&assignment))
            .await
            .unwrap();
        assert!(updated.is_council_member);
        assert_eq!(updated.council_role.as_deref(), Some("President"));

        let removed = repo.set_council_membership(&user.id, None).await.unwrap();
        assert!(!removed.is_council_member);
        assert!(removed.council_role.is_none());
    }

    #[tokio::test]
    async fn test_writes_bump_revision() {
        let (repo, _dir) = repo().await;
        let initial = repo.get_revision_id().await.unwrap();
        repo.add_activity("uid", "Posted Message", "hi").await.unwrap();
        assert_eq!(repo.get_revision_id().await.unwrap(), initial + 1);
        assert_eq!(repo.list_activity(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscription_delivers_snapshot_after_write() {
        let (repo, _dir) = repo().await;
        let mut sub = repo.subscribe_messages().await.unwrap();
        assert!(sub.current().unwrap().docs.is_empty());

        repo.add_message(&message("first", WriteTimestamp::Server))
            .await
            .unwrap();

        assert!(sub.changed().await);
        let snapshot = sub.current().unwrap();
        assert_eq!(snapshot.docs.len(), 1);
        assert_eq!(snapshot.docs[0].text, "first");
        sub.unsubscribe();
    }

    #[tokio::test]
    async fn test_subscription_ignores_other_collections() {
        let (repo, _dir) = repo().await;
        let mut sub = repo.subscribe_events().await.unwrap();

        repo.add_message(&message("noise", WriteTimestamp::Server))
            .await
            .unwrap();

        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(200), sub.changed()).await;
        assert!(waited.is_err(), "events subscription woke for a message write");
    }

    #[tokio::test]
    async fn test_failed_revision_bump_rolls_back_write() {
        let (repo, _dir) = repo().await;
        let mut changes = repo.changes();
        sqlx::query(
            "CREATE TRIGGER meta_readonly BEFORE UPDATE ON meta BEGIN SELECT RAISE(ABORT, 'meta is read-only'); END",
        )
        .execute(&repo.pool)
        .await
        .unwrap();

        let result = repo
            .add_message(&message("lost", WriteTimestamp::Server))
            .await;
        assert!(matches!(result, Err(AppError::Database(_))));
        assert!(repo.list_messages().await.unwrap().is_empty());
        assert!(changes.try_recv().is_err());

        sqlx::query("DROP TRIGGER meta_readonly")
            .execute(&repo.pool)
            .await
            .unwrap();
        repo.add_message(&message("kept", WriteTimestamp::Server))
            .await
            .unwrap();
        assert_eq!(repo.list_messages().await.unwrap().len(), 1);
        assert_eq!(changes.try_recv().unwrap(), Collection::Messages);
    }

    #[tokio::test]
    async fn test_subscribe_on_closed_store_is_unavailable() {
        let (repo, _dir) = repo().await;
        repo.pool.close().await;

        let err = repo.subscribe_messages().await.err().unwrap();
        assert!(matches!(err, AppError::Unavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_subscription_reports_failed_reload_then_recovers() {
        let (repo, _dir) = repo().await;
        let mut sub = repo.subscribe_messages().await.unwrap();

        sqlx::query("ALTER TABLE messages RENAME TO messages_offline")
            .execute(&repo.pool)
            .await
            .unwrap();
        repo.announce(Collection::Messages);
        assert!(sub.changed().await);
        assert!(sub.current().is_err());

        sqlx::query("ALTER TABLE messages_offline RENAME TO messages")
            .execute(&repo.pool)
            .await
            .unwrap();
        repo.add_message(&message("back", WriteTimestamp::Server))
            .await
            .unwrap();
        assert!(sub.changed().await);
        assert_eq!(sub.current().unwrap().docs.len(), 1);
    }
}
