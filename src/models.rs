use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;

// --- Core Records (Mapped to Database) ---

/// User
///
/// A registered forum member from the `users` table. The password hash never leaves
/// the server: it is skipped when the record is serialized into a template context.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    // Unique sign-in identifier.
    pub email: String,
    pub nickname: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Topic
///
/// A discussion topic from the `topics` table. IDs are assigned in ascending order,
/// which is also the order the index lists them in.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default, PartialEq)]
pub struct Topic {
    pub id: i64,
    // FK to users.id (Owner). Only the owner may edit or delete.
    pub author_id: Uuid,
    // Nickname captured when the topic was posted.
    pub author_name: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// SessionUser
///
/// The identity resolved from a valid session cookie. This is what handlers and
/// templates see as "the current user".
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub nickname: String,
}

impl From<User> for SessionUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            nickname: user.nickname,
        }
    }
}

// --- Request Payloads (Input Schemas) ---

/// Credentials
///
/// Body of `POST /signin`. Missing fields decode as empty strings so that the
/// validation layer reports them instead of the body decoder.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// SignupForm
///
/// Body of `POST /signup`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SignupForm {
    pub email: String,
    pub nickname: String,
    pub password: String,
}

/// TopicForm
///
/// Body of `POST /topic/create` and `POST /topic/{topicId}/edit`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TopicForm {
    pub title: String,
    pub content: String,
}

/// NewTopic
///
/// A validated topic ready to be persisted by the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTopic {
    pub author_id: Uuid,
    pub author_name: String,
    pub title: String,
    pub content: String,
}

/// NewUser
///
/// A validated registration with the password already hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub nickname: String,
    pub password_hash: String,
}

/// TopicChanges
///
/// Replacement title and content applied by an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicChanges {
    pub title: String,
    pub content: String,
}

// --- Route Parameters ---

/// TopicPath
///
/// The typed view of the router's capture map for `/topic/{topicId}/...` routes.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicPath {
    #[serde(rename = "topicId")]
    pub topic_id: String,
}

impl TopicPath {
    pub fn new(topic_id: impl Into<String>) -> Self {
        Self {
            topic_id: topic_id.into(),
        }
    }

    /// Parses the captured segment. Anything that is not a topic ID cannot name an
    /// existing topic, so it is reported as not found rather than as a bad request.
    pub fn id(&self) -> Result<i64, AppError> {
        self.topic_id
            .parse::<i64>()
            .map_err(|_| AppError::NotFound(format!("topic {}", self.topic_id)))
    }
}
