use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{NewTopic, NewUser, Topic, TopicChanges, User};

/// RepositoryError
///
/// Failures surfaced by the persistence layer. Callers forward these; nothing in the
/// accessor retries or swallows them.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    // A uniqueness constraint rejected the write (e.g. email already registered).
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Repository Trait
///
/// The data accessor. Handlers only see this contract, never the concrete store, so
/// Postgres, the in-memory store and test doubles are interchangeable.
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across Axum's
/// task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Topics ---
    // All topics in insertion (ascending ID) order.
    async fn list_topics(&self) -> RepositoryResult<Vec<Topic>>;
    async fn get_topic(&self, id: i64) -> RepositoryResult<Option<Topic>>;
    async fn create_topic(&self, topic: NewTopic) -> RepositoryResult<Topic>;
    // `None` when the topic does not exist.
    async fn update_topic(&self, id: i64, changes: TopicChanges)
    -> RepositoryResult<Option<Topic>>;
    // `false` when the topic does not exist.
    async fn delete_topic(&self, id: i64) -> RepositoryResult<bool>;

    // --- Users ---
    async fn get_user(&self, id: Uuid) -> RepositoryResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;
    // Fails with `RepositoryError::Conflict` when the email is already registered.
    async fn create_user(&self, user: NewUser) -> RepositoryResult<User>;
}

/// RepositoryState
///
/// The concrete type used to share the accessor across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const TOPIC_COLUMNS: &str = "id, author_id, author_name, title, content, created_at, updated_at";
const USER_COLUMNS: &str = "id, email, nickname, password_hash, created_at";

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn list_topics(&self) -> RepositoryResult<Vec<Topic>> {
        let sql = format!("SELECT {TOPIC_COLUMNS} FROM topics ORDER BY id ASC");
        let topics = sqlx::query_as::<_, Topic>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(topics)
    }

    async fn get_topic(&self, id: i64) -> RepositoryResult<Option<Topic>> {
        let sql = format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE id = $1");
        let topic = sqlx::query_as::<_, Topic>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(topic)
    }

    async fn create_topic(&self, topic: NewTopic) -> RepositoryResult<Topic> {
        let sql = format!(
            "INSERT INTO topics (author_id, author_name, title, content, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, NOW(), NOW()) RETURNING {TOPIC_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Topic>(&sql)
            .bind(topic.author_id)
            .bind(topic.author_name)
            .bind(topic.title)
            .bind(topic.content)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn update_topic(
        &self,
        id: i64,
        changes: TopicChanges,
    ) -> RepositoryResult<Option<Topic>> {
        let sql = format!(
            "UPDATE topics SET title = $2, content = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING {TOPIC_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Topic>(&sql)
            .bind(id)
            .bind(changes.title)
            .bind(changes.content)
            .fetch_optional(&self.pool)
            .await?;
        Ok(updated)
    }

    async fn delete_topic(&self, id: i64) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM topics WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_user(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> RepositoryResult<User> {
        let sql = format!(
            "INSERT INTO users (id, email, nickname, password_hash, created_at) \
             VALUES ($1, $2, $3, $4, NOW()) RETURNING {USER_COLUMNS}"
        );
        let email = user.email.clone();
        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(user.email)
            .bind(user.nickname)
            .bind(user.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if e.as_database_error()
                    .is_some_and(|db| db.is_unique_violation())
                {
                    RepositoryError::Conflict(format!("email {email} is already registered"))
                } else {
                    RepositoryError::Database(e)
                }
            })
    }
}

#[derive(Default)]
struct MemoryTables {
    topics: BTreeMap<i64, Topic>,
    users: HashMap<Uuid, User>,
    next_topic_id: i64,
}

/// InMemoryRepository
///
/// A `Repository` kept entirely in process memory. Used for local development when
/// no `DATABASE_URL` is configured, and by the test suite. Topic IDs start at 1 and
/// are never reused.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<MemoryTables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a topic with a caller-chosen ID. Later inserts continue above it.
    pub async fn seed_topic(&self, topic: Topic) {
        let mut tables = self.tables.write().await;
        tables.next_topic_id = tables.next_topic_id.max(topic.id);
        tables.topics.insert(topic.id, topic);
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn list_topics(&self) -> RepositoryResult<Vec<Topic>> {
        let tables = self.tables.read().await;
        Ok(tables.topics.values().cloned().collect())
    }

    async fn get_topic(&self, id: i64) -> RepositoryResult<Option<Topic>> {
        let tables = self.tables.read().await;
        Ok(tables.topics.get(&id).cloned())
    }

    async fn create_topic(&self, topic: NewTopic) -> RepositoryResult<Topic> {
        let mut tables = self.tables.write().await;
        tables.next_topic_id += 1;
        let now = Utc::now();
        let created = Topic {
            id: tables.next_topic_id,
            author_id: topic.author_id,
            author_name: topic.author_name,
            title: topic.title,
            content: topic.content,
            created_at: now,
            updated_at: now,
        };
        tables.topics.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_topic(
        &self,
        id: i64,
        changes: TopicChanges,
    ) -> RepositoryResult<Option<Topic>> {
        let mut tables = self.tables.write().await;
        Ok(tables.topics.get_mut(&id).map(|topic| {
            topic.title = changes.title;
            topic.content = changes.content;
            topic.updated_at = Utc::now();
            topic.clone()
        }))
    }

    async fn delete_topic(&self, id: i64) -> RepositoryResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.topics.remove(&id).is_some())
    }

    async fn get_user(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> RepositoryResult<User> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(RepositoryError::Conflict(format!(
                "email {} is already registered",
                user.email
            )));
        }
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            nickname: user.nickname,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }
}
