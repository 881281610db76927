//! SQLite identity store backend.

use super::{Correspondence, IdentityStore, NewCorrespondence, TopicRecord, UserRecord};
use crate::error::StoreError;
use async_trait::async_trait;
use mailroom_types::{CorrespondenceId, Direction, MessageId, Sender, TopicId, UserId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// SQLite-based identity store.
///
/// Uses WAL mode for concurrent reads/writes; uniqueness invariants
/// live in the schema, so races surface as constraint violations
/// rather than silent duplicates.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path.to_str().unwrap_or("mailroom.db"))
            .map_err(StoreError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StoreError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                display_name TEXT NOT NULL,
                first_seen INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS topics (
                topic_id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(user_id),
                created_at INTEGER NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        // At most one live topic per user.
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_topics_live_owner
            ON topics(user_id) WHERE deleted = 0
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS correspondences (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(user_id),
                user_message_id INTEGER NOT NULL,
                topic_id INTEGER NOT NULL REFERENCES topics(topic_id),
                operator_message_id INTEGER NOT NULL,
                direction TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                UNIQUE(user_id, user_message_id, direction),
                UNIQUE(topic_id, operator_message_id, direction)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_corr_operator
            ON correspondences(topic_id, operator_message_id)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(())
    }

    fn current_timestamp() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn upsert_user(&self, sender: &Sender) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, display_name, first_seen)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET display_name = excluded.display_name
            "#,
        )
        .bind(sender.id.value())
        .bind(&sender.display_name)
        .bind(Self::current_timestamp())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        tracing::debug!("Saved user {}", sender.id);
        Ok(())
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, display_name, first_seen
            FROM users WHERE user_id = ?1
            "#,
        )
        .bind(user_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(row.map(UserRecord::from))
    }

    async fn topic_for_user(&self, user_id: UserId) -> Result<Option<TopicRecord>, StoreError> {
        let row = sqlx::query_as::<_, TopicRow>(
            r#"
            SELECT topic_id, user_id, created_at, deleted
            FROM topics WHERE user_id = ?1 AND deleted = 0
            "#,
        )
        .bind(user_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(row.map(TopicRecord::from))
    }

    async fn insert_topic(
        &self,
        user_id: UserId,
        topic_id: TopicId,
    ) -> Result<TopicRecord, StoreError> {
        // If another creation won the race, keep the existing row; the
        // caller compares topic ids and discards the loser.
        sqlx::query(
            r#"
            INSERT INTO topics (topic_id, user_id, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) WHERE deleted = 0 DO NOTHING
            "#,
        )
        .bind(topic_id.value())
        .bind(user_id.value())
        .bind(Self::current_timestamp())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        let winner = self.topic_for_user(user_id).await?.ok_or_else(|| {
            StoreError::CorruptRow {
                table: "topics",
                detail: format!("no live topic for user {} after insert", user_id),
            }
        })?;

        tracing::debug!(
            "Topic {} recorded for user {} (created id {})",
            winner.topic_id,
            user_id,
            topic_id
        );
        Ok(winner)
    }

    async fn retire_topic(&self, topic_id: TopicId) -> Result<(), StoreError> {
        sqlx::query("UPDATE topics SET deleted = 1 WHERE topic_id = ?1")
            .bind(topic_id.value())
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        tracing::debug!("Retired topic {}", topic_id);
        Ok(())
    }

    async fn topic_owner(&self, topic_id: TopicId) -> Result<Option<UserId>, StoreError> {
        let owner: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT user_id FROM topics WHERE topic_id = ?1 AND deleted = 0
            "#,
        )
        .bind(topic_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(owner.map(UserId::new))
    }

    async fn record_correspondence(
        &self,
        new: NewCorrespondence,
    ) -> Result<Correspondence, StoreError> {
        let created_at = Self::current_timestamp();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO correspondences
                (user_id, user_message_id, topic_id, operator_message_id, direction, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING id
            "#,
        )
        .bind(new.user_id.value())
        .bind(new.user_message_id.value())
        .bind(new.topic_id.value())
        .bind(new.operator_message_id.value())
        .bind(new.direction.as_str())
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::DuplicateCorrespondence {
                    detail: format!(
                        "user {} message {} / topic {} message {} ({})",
                        new.user_id,
                        new.user_message_id,
                        new.topic_id,
                        new.operator_message_id,
                        new.direction
                    ),
                }
            }
            other => StoreError::Database(other),
        })?;

        tracing::debug!(
            "Recorded correspondence {}: user {} msg {} <-> topic {} msg {} ({})",
            id,
            new.user_id,
            new.user_message_id,
            new.topic_id,
            new.operator_message_id,
            new.direction
        );

        Ok(Correspondence {
            id: CorrespondenceId::new(id),
            user_id: new.user_id,
            user_message_id: new.user_message_id,
            topic_id: new.topic_id,
            operator_message_id: new.operator_message_id,
            direction: new.direction,
            deleted: false,
            created_at,
        })
    }

    async fn find_by_user_message(
        &self,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<Option<Correspondence>, StoreError> {
        let row = sqlx::query_as::<_, CorrespondenceRow>(
            r#"
            SELECT id, user_id, user_message_id, topic_id, operator_message_id,
                   direction, deleted, created_at
            FROM correspondences
            WHERE user_id = ?1 AND user_message_id = ?2
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.value())
        .bind(message_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        row.map(Correspondence::try_from).transpose()
    }

    async fn find_by_operator_message(
        &self,
        topic_id: TopicId,
        message_id: MessageId,
    ) -> Result<Option<Correspondence>, StoreError> {
        let row = sqlx::query_as::<_, CorrespondenceRow>(
            r#"
            SELECT id, user_id, user_message_id, topic_id, operator_message_id,
                   direction, deleted, created_at
            FROM correspondences
            WHERE topic_id = ?1 AND operator_message_id = ?2
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(topic_id.value())
        .bind(message_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        row.map(Correspondence::try_from).transpose()
    }

    async fn mark_deleted(&self, id: CorrespondenceId) -> Result<(), StoreError> {
        sqlx::query("UPDATE correspondences SET deleted = 1 WHERE id = ?1")
            .bind(id.value())
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        tracing::debug!("Marked correspondence {} deleted", id);
        Ok(())
    }
}

/// Internal row type for user queries.
#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: i64,
    display_name: String,
    first_seen: i64,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::new(row.user_id),
            display_name: row.display_name,
            first_seen: row.first_seen,
        }
    }
}

/// Internal row type for topic queries.
#[derive(sqlx::FromRow)]
struct TopicRow {
    topic_id: i64,
    user_id: i64,
    created_at: i64,
    deleted: bool,
}

impl From<TopicRow> for TopicRecord {
    fn from(row: TopicRow) -> Self {
        Self {
            topic_id: TopicId::new(row.topic_id),
            user_id: UserId::new(row.user_id),
            created_at: row.created_at,
            deleted: row.deleted,
        }
    }
}

/// Internal row type for correspondence queries.
#[derive(sqlx::FromRow)]
struct CorrespondenceRow {
    id: i64,
    user_id: i64,
    user_message_id: i64,
    topic_id: i64,
    operator_message_id: i64,
    direction: String,
    deleted: bool,
    created_at: i64,
}

impl TryFrom<CorrespondenceRow> for Correspondence {
    type Error = StoreError;

    fn try_from(row: CorrespondenceRow) -> Result<Self, Self::Error> {
        let direction =
            Direction::from_str(&row.direction).ok_or_else(|| StoreError::CorruptRow {
                table: "correspondences",
                detail: format!("unknown direction tag {:?} in row {}", row.direction, row.id),
            })?;

        Ok(Self {
            id: CorrespondenceId::new(row.id),
            user_id: UserId::new(row.user_id),
            user_message_id: MessageId::new(row.user_message_id),
            topic_id: TopicId::new(row.topic_id),
            operator_message_id: MessageId::new(row.operator_message_id),
            direction,
            deleted: row.deleted,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> Sender {
        Sender::new(UserId::new(42), "Ada")
    }

    async fn store_with_topic(user: &Sender, topic: TopicId) -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_user(user).await.unwrap();
        store.insert_topic(user.id, topic).await.unwrap();
        store
    }

    fn pair_request(user: UserId, user_msg: i64, topic: TopicId, op_msg: i64) -> NewCorrespondence {
        NewCorrespondence {
            user_id: user,
            user_message_id: MessageId::new(user_msg),
            topic_id: topic,
            operator_message_id: MessageId::new(op_msg),
            direction: Direction::UserToOperator,
        }
    }

    #[tokio::test]
    async fn upsert_user_inserts_and_refreshes_name() {
        let store = SqliteStore::in_memory().await.unwrap();

        store.upsert_user(&ada()).await.unwrap();
        let first = store.get_user(UserId::new(42)).await.unwrap().unwrap();
        assert_eq!(first.display_name, "Ada");

        store
            .upsert_user(&Sender::new(UserId::new(42), "Ada L."))
            .await
            .unwrap();
        let second = store.get_user(UserId::new(42)).await.unwrap().unwrap();
        assert_eq!(second.display_name, "Ada L.");
        assert_eq!(second.first_seen, first.first_seen);
    }

    #[tokio::test]
    async fn topic_for_user_empty_when_none_recorded() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_user(&ada()).await.unwrap();

        let topic = store.topic_for_user(UserId::new(42)).await.unwrap();
        assert!(topic.is_none());
    }

    #[tokio::test]
    async fn insert_topic_returns_the_new_record() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_user(&ada()).await.unwrap();

        let record = store
            .insert_topic(UserId::new(42), TopicId::new(7))
            .await
            .unwrap();
        assert_eq!(record.topic_id, TopicId::new(7));
        assert_eq!(record.user_id, UserId::new(42));
        assert!(!record.deleted);
    }

    #[tokio::test]
    async fn insert_topic_race_keeps_the_winner() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_user(&ada()).await.unwrap();

        let winner = store
            .insert_topic(UserId::new(42), TopicId::new(7))
            .await
            .unwrap();
        // Second creation for the same user: the row must not change.
        let loser = store
            .insert_topic(UserId::new(42), TopicId::new(8))
            .await
            .unwrap();

        assert_eq!(winner.topic_id, TopicId::new(7));
        assert_eq!(loser.topic_id, TopicId::new(7));
        assert_eq!(
            store.topic_owner(TopicId::new(8)).await.unwrap(),
            None,
            "losing topic id must never be recorded"
        );
    }

    #[tokio::test]
    async fn retired_topic_frees_the_owner_slot() {
        let store = store_with_topic(&ada(), TopicId::new(7)).await;

        store.retire_topic(TopicId::new(7)).await.unwrap();
        assert!(store.topic_for_user(UserId::new(42)).await.unwrap().is_none());
        assert_eq!(store.topic_owner(TopicId::new(7)).await.unwrap(), None);

        // A replacement topic can now be recorded.
        let fresh = store
            .insert_topic(UserId::new(42), TopicId::new(9))
            .await
            .unwrap();
        assert_eq!(fresh.topic_id, TopicId::new(9));
    }

    #[tokio::test]
    async fn topic_owner_resolves_live_topics() {
        let store = store_with_topic(&ada(), TopicId::new(7)).await;

        assert_eq!(
            store.topic_owner(TopicId::new(7)).await.unwrap(),
            Some(UserId::new(42))
        );
        assert_eq!(store.topic_owner(TopicId::new(777)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn record_and_find_by_both_sides() {
        let store = store_with_topic(&ada(), TopicId::new(7)).await;

        let recorded = store
            .record_correspondence(pair_request(UserId::new(42), 100, TopicId::new(7), 200))
            .await
            .unwrap();
        assert!(!recorded.deleted);

        let by_user = store
            .find_by_user_message(UserId::new(42), MessageId::new(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_user, recorded);

        let by_operator = store
            .find_by_operator_message(TopicId::new(7), MessageId::new(200))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_operator, recorded);
    }

    #[tokio::test]
    async fn find_misses_return_none() {
        let store = store_with_topic(&ada(), TopicId::new(7)).await;

        assert!(store
            .find_by_user_message(UserId::new(42), MessageId::new(1))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_operator_message(TopicId::new(7), MessageId::new(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_correspondence_is_rejected() {
        let store = store_with_topic(&ada(), TopicId::new(7)).await;

        store
            .record_correspondence(pair_request(UserId::new(42), 100, TopicId::new(7), 200))
            .await
            .unwrap();

        let err = store
            .record_correspondence(pair_request(UserId::new(42), 100, TopicId::new(7), 201))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCorrespondence { .. }));

        let err = store
            .record_correspondence(pair_request(UserId::new(42), 101, TopicId::new(7), 200))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCorrespondence { .. }));
    }

    #[tokio::test]
    async fn same_ids_in_opposite_directions_coexist() {
        let store = store_with_topic(&ada(), TopicId::new(7)).await;

        store
            .record_correspondence(pair_request(UserId::new(42), 100, TopicId::new(7), 200))
            .await
            .unwrap();

        let reverse = NewCorrespondence {
            direction: Direction::OperatorToUser,
            ..pair_request(UserId::new(42), 100, TopicId::new(7), 200)
        };
        store.record_correspondence(reverse).await.unwrap();
    }

    #[tokio::test]
    async fn mark_deleted_is_idempotent() {
        let store = store_with_topic(&ada(), TopicId::new(7)).await;

        let recorded = store
            .record_correspondence(pair_request(UserId::new(42), 100, TopicId::new(7), 200))
            .await
            .unwrap();

        store.mark_deleted(recorded.id).await.unwrap();
        store.mark_deleted(recorded.id).await.unwrap();

        let found = store
            .find_by_user_message(UserId::new(42), MessageId::new(100))
            .await
            .unwrap()
            .unwrap();
        assert!(found.deleted);
    }

    #[tokio::test]
    async fn deleted_pair_does_not_block_a_fresh_relay() {
        // A new send reuses neither row nor ids: message ids differ,
        // so a fresh correspondence appears alongside the deleted one.
        let store = store_with_topic(&ada(), TopicId::new(7)).await;

        let old = store
            .record_correspondence(pair_request(UserId::new(42), 100, TopicId::new(7), 200))
            .await
            .unwrap();
        store.mark_deleted(old.id).await.unwrap();

        let fresh = store
            .record_correspondence(pair_request(UserId::new(42), 101, TopicId::new(7), 201))
            .await
            .unwrap();
        assert_ne!(fresh.id, old.id);
        assert!(!fresh.deleted);
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailroom.db");

        {
            let store = SqliteStore::new(&path).await.unwrap();
            store.upsert_user(&ada()).await.unwrap();
            store
                .insert_topic(UserId::new(42), TopicId::new(7))
                .await
                .unwrap();
        }

        let reopened = SqliteStore::new(&path).await.unwrap();
        let topic = reopened
            .topic_for_user(UserId::new(42))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(topic.topic_id, TopicId::new(7));
    }
}
