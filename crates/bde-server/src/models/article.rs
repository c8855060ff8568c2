//! Article resource

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Allowed article statuses.
pub const ARTICLE_STATUSES: [&str; 2] = ["draft", "published"];

/// An article as stored and exported.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Article {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub body: String,
    pub author_id: String,
    pub tags: Vec<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An article as parsed from one NDJSON line, before validation.
///
/// Missing keys deserialize to their defaults so the validator sees empty
/// strings, never a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArticleNdjsonRecord {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub body: String,
    pub author_id: String,
    pub tags: Vec<String>,
    pub status: String,
    pub published_at: String,
}
