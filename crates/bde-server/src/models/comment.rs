//! Comment resource

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum allowed words in a comment body.
pub const MAX_COMMENT_WORDS: usize = 500;

/// A comment as stored and exported.
///
/// Comment ids are either UUIDs or `cm_`-prefixed strings, so the column is
/// plain text.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: String,
    pub article_id: String,
    pub user_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A comment as parsed from one NDJSON line, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommentNdjsonRecord {
    pub id: String,
    pub article_id: String,
    pub user_id: String,
    pub body: String,
    pub created_at: String,
}
