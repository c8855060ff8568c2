//! User resource

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Allowed user roles.
pub const USER_ROLES: [&str; 3] = ["admin", "editor", "viewer"];

/// A user as stored and exported.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user row as read from an import CSV, before validation.
///
/// Every field is kept as the raw string so the validator can report the
/// offending value verbatim; `active` stays `"true"`/`"false"`/empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserCsvRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub active: String,
    pub created_at: String,
    pub updated_at: String,
}
