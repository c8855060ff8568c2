//! Per-record validation with cross-record state
//!
//! One [`Validator`] is built per import job. It owns the uniqueness caches
//! (lowercased emails, slugs) that grow as records are accepted, and the
//! foreign-key caches (user ids, article ids) that are loaded in bulk before
//! streaming begins. Every rule for a record is evaluated; the returned list
//! carries every violation so one upload surfaces every fixable defect in a
//! single pass.

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{
    ArticleNdjsonRecord, CommentNdjsonRecord, UserCsvRecord, ARTICLE_STATUSES, MAX_COMMENT_WORDS,
    USER_ROLES,
};

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex")
});

static SLUG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("slug regex"));

/// A single field-level violation, before the line number is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
    pub value: Option<String>,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
            value: None,
        }
    }

    fn with_value(field: &'static str, message: impl Into<String>, value: &str) -> Self {
        Self {
            field,
            message: message.into(),
            value: Some(value.to_string()),
        }
    }
}

/// Stateful validator bound to a single import job.
#[derive(Debug, Default)]
pub struct Validator {
    user_emails: HashSet<String>,
    article_slugs: HashSet<String>,
    user_ids: HashSet<String>,
    article_ids: HashSet<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the set of existing user ids for FK validation.
    pub fn set_user_id_cache(&mut self, ids: Vec<String>) {
        self.user_ids.extend(ids);
    }

    /// Load the set of existing article ids for FK validation.
    pub fn set_article_id_cache(&mut self, ids: Vec<String>) {
        self.article_ids.extend(ids);
    }

    /// Record an accepted email in the uniqueness cache.
    pub fn add_user_email(&mut self, email: &str) {
        self.user_emails.insert(email.to_lowercase());
    }

    /// Record an accepted slug in the uniqueness cache.
    pub fn add_article_slug(&mut self, slug: &str) {
        self.article_slugs.insert(slug.to_string());
    }

    /// Record an accepted user id so later records can reference it.
    pub fn add_user_id(&mut self, id: &str) {
        self.user_ids.insert(id.to_string());
    }

    /// Record an accepted article id so later records can reference it.
    pub fn add_article_id(&mut self, id: &str) {
        self.article_ids.insert(id.to_string());
    }

    /// Validate a user record. Field order: id, email, name, role, active,
    /// created_at.
    pub fn validate_user(&self, user: &UserCsvRecord) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if user.id.is_empty() {
            errors.push(FieldError::new("id", "id is required"));
        } else if !is_valid_uuid(&user.id) {
            errors.push(FieldError::with_value("id", "invalid UUID format", &user.id));
        }

        if user.email.is_empty() {
            errors.push(FieldError::new("email", "email is required"));
        } else if !EMAIL_REGEX.is_match(&user.email) {
            errors.push(FieldError::with_value(
                "email",
                "invalid email format",
                &user.email,
            ));
        } else if self.user_emails.contains(&user.email.to_lowercase()) {
            errors.push(FieldError::with_value(
                "email",
                "duplicate email",
                &user.email,
            ));
        }

        if user.name.is_empty() {
            errors.push(FieldError::new("name", "name is required"));
        }

        if user.role.is_empty() {
            errors.push(FieldError::new("role", "role is required"));
        } else if !USER_ROLES.contains(&user.role.as_str()) {
            errors.push(FieldError::with_value(
                "role",
                "invalid role, must be one of: admin, editor, viewer",
                &user.role,
            ));
        }

        // Empty means omitted; anything else must be a strict boolean literal.
        if !user.active.is_empty() && user.active != "true" && user.active != "false" {
            errors.push(FieldError::with_value(
                "active",
                "active must be 'true' or 'false'",
                &user.active,
            ));
        }

        if user.created_at.is_empty() {
            errors.push(FieldError::new("created_at", "created_at is required"));
        } else if !is_valid_rfc3339(&user.created_at) {
            errors.push(FieldError::with_value(
                "created_at",
                "invalid ISO 8601 date format",
                &user.created_at,
            ));
        }

        errors
    }

    /// Validate an article record. Field order: id, slug, title, body,
    /// author_id, status, published_at.
    pub fn validate_article(&self, article: &ArticleNdjsonRecord) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if article.id.is_empty() {
            errors.push(FieldError::new("id", "id is required"));
        } else if !is_valid_uuid(&article.id) {
            errors.push(FieldError::with_value(
                "id",
                "invalid UUID format",
                &article.id,
            ));
        }

        if article.slug.is_empty() {
            errors.push(FieldError::new("slug", "slug is required"));
        } else if !SLUG_REGEX.is_match(&article.slug) {
            errors.push(FieldError::with_value(
                "slug",
                "slug must be kebab-case (lowercase letters, numbers, hyphens)",
                &article.slug,
            ));
        } else if self.article_slugs.contains(&article.slug) {
            errors.push(FieldError::with_value(
                "slug",
                "duplicate slug",
                &article.slug,
            ));
        }

        if article.title.is_empty() {
            errors.push(FieldError::new("title", "title is required"));
        }

        if article.body.is_empty() {
            errors.push(FieldError::new("body", "body is required"));
        }

        if article.author_id.is_empty() {
            errors.push(FieldError::new("author_id", "author_id is required"));
        } else if !is_valid_uuid(&article.author_id) {
            errors.push(FieldError::with_value(
                "author_id",
                "invalid UUID format",
                &article.author_id,
            ));
        } else if !self.user_ids.is_empty() && !self.user_ids.contains(&article.author_id) {
            errors.push(FieldError::with_value(
                "author_id",
                "referenced user does not exist",
                &article.author_id,
            ));
        }

        // Empty status is accepted and defaults to draft at conversion time.
        if !article.status.is_empty() && !ARTICLE_STATUSES.contains(&article.status.as_str()) {
            errors.push(FieldError::with_value(
                "status",
                "invalid status, must be one of: draft, published",
                &article.status,
            ));
        }

        if article.status == "draft" && !article.published_at.is_empty() {
            errors.push(FieldError::new(
                "published_at",
                "draft articles must not have published_at",
            ));
        }

        if !article.published_at.is_empty() && !is_valid_rfc3339(&article.published_at) {
            errors.push(FieldError::with_value(
                "published_at",
                "invalid ISO 8601 date format",
                &article.published_at,
            ));
        }

        errors
    }

    /// Validate a comment record. Field order: id, article_id, user_id, body,
    /// created_at.
    pub fn validate_comment(&self, comment: &CommentNdjsonRecord) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if comment.id.is_empty() {
            errors.push(FieldError::new("id", "id is required"));
        } else if !is_valid_uuid(&comment.id) && !comment.id.starts_with("cm_") {
            errors.push(FieldError::with_value(
                "id",
                "invalid ID format",
                &comment.id,
            ));
        }

        if comment.article_id.is_empty() {
            errors.push(FieldError::new("article_id", "article_id is required"));
        } else if !is_valid_uuid(&comment.article_id) {
            errors.push(FieldError::with_value(
                "article_id",
                "invalid UUID format",
                &comment.article_id,
            ));
        } else if !self.article_ids.is_empty() && !self.article_ids.contains(&comment.article_id) {
            errors.push(FieldError::with_value(
                "article_id",
                "referenced article does not exist",
                &comment.article_id,
            ));
        }

        if comment.user_id.is_empty() {
            errors.push(FieldError::new("user_id", "user_id is required"));
        } else if !is_valid_uuid(&comment.user_id) {
            errors.push(FieldError::with_value(
                "user_id",
                "invalid UUID format",
                &comment.user_id,
            ));
        } else if !self.user_ids.is_empty() && !self.user_ids.contains(&comment.user_id) {
            errors.push(FieldError::with_value(
                "user_id",
                "referenced user does not exist",
                &comment.user_id,
            ));
        }

        if comment.body.is_empty() {
            errors.push(FieldError::new("body", "body is required"));
        } else {
            let word_count = comment.body.split_whitespace().count();
            if word_count > MAX_COMMENT_WORDS {
                errors.push(FieldError::new(
                    "body",
                    format!(
                        "body exceeds maximum of {} words (has {})",
                        MAX_COMMENT_WORDS, word_count
                    ),
                ));
            }
        }

        if comment.created_at.is_empty() {
            errors.push(FieldError::new("created_at", "created_at is required"));
        } else if !is_valid_rfc3339(&comment.created_at) {
            errors.push(FieldError::with_value(
                "created_at",
                "invalid ISO 8601 date format",
                &comment.created_at,
            ));
        }

        errors
    }
}

fn is_valid_uuid(s: &str) -> bool {
    Uuid::try_parse(s).is_ok()
}

fn is_valid_rfc3339(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_user() -> UserCsvRecord {
        UserCsvRecord {
            id: "11111111-1111-1111-1111-111111111111".to_string(),
            email: "a@x.io".to_string(),
            name: "A".to_string(),
            role: "admin".to_string(),
            active: "true".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: String::new(),
        }
    }

    fn valid_article() -> ArticleNdjsonRecord {
        ArticleNdjsonRecord {
            id: "22222222-2222-2222-2222-222222222222".to_string(),
            slug: "hello-world".to_string(),
            title: "Hello".to_string(),
            body: "Body".to_string(),
            author_id: "11111111-1111-1111-1111-111111111111".to_string(),
            tags: vec!["intro".to_string()],
            status: "published".to_string(),
            published_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn valid_comment() -> CommentNdjsonRecord {
        CommentNdjsonRecord {
            id: "33333333-3333-3333-3333-333333333333".to_string(),
            article_id: "22222222-2222-2222-2222-222222222222".to_string(),
            user_id: "11111111-1111-1111-1111-111111111111".to_string(),
            body: "nice read".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn valid_records_pass() {
        let v = Validator::new();
        assert!(v.validate_user(&valid_user()).is_empty());
        assert!(v.validate_article(&valid_article()).is_empty());
        assert!(v.validate_comment(&valid_comment()).is_empty());
    }

    #[test]
    fn user_missing_fields_reported_in_field_order() {
        let v = Validator::new();
        let errors = v.validate_user(&UserCsvRecord::default());

        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["id", "email", "name", "role", "created_at"]);
        assert!(errors.iter().all(|e| e.message.ends_with("is required")));
    }

    #[test]
    fn user_all_violations_reported_not_just_first() {
        let v = Validator::new();
        let mut user = valid_user();
        user.id = "not-a-uuid".to_string();
        user.email = "not-an-email".to_string();
        user.role = "superuser".to_string();

        let errors = v.validate_user(&user);
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].field, "id");
        assert_eq!(errors[1].field, "email");
        assert_eq!(errors[2].field, "role");
    }

    #[test]
    fn duplicate_email_is_case_insensitive() {
        let mut v = Validator::new();
        v.add_user_email("A@X.io");

        let mut user = valid_user();
        user.email = "a@x.IO".to_string();

        let errors = v.validate_user(&user);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "email");
        assert_eq!(errors[0].message, "duplicate email");
        assert_eq!(errors[0].value.as_deref(), Some("a@x.IO"));
    }

    #[test]
    fn missing_email_not_shadowed_by_duplicate_check() {
        let mut v = Validator::new();
        v.add_user_email("a@x.io");

        let mut user = valid_user();
        user.email = String::new();

        let errors = v.validate_user(&user);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "email is required");
    }

    #[test]
    fn active_empty_is_accepted_other_strings_rejected() {
        let v = Validator::new();

        let mut user = valid_user();
        user.active = String::new();
        assert!(v.validate_user(&user).is_empty());

        user.active = "yes".to_string();
        let errors = v.validate_user(&user);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "active");
    }

    #[test]
    fn slug_kebab_case_boundaries() {
        let v = Validator::new();
        let cases = [
            ("a-b", true),
            ("a", true),
            ("a1-b2-c3", true),
            ("-a", false),
            ("a-", false),
            ("a--b", false),
            ("A-b", false),
            ("a_b", false),
        ];
        for (slug, ok) in cases {
            let mut article = valid_article();
            article.slug = slug.to_string();
            let errors = v.validate_article(&article);
            assert_eq!(errors.is_empty(), ok, "slug {:?}", slug);
        }
    }

    #[test]
    fn duplicate_slug_detected() {
        let mut v = Validator::new();
        v.add_article_slug("hello-world");

        let errors = v.validate_article(&valid_article());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "duplicate slug");
    }

    #[test]
    fn draft_with_published_at_is_one_error() {
        let v = Validator::new();
        let mut article = valid_article();
        article.status = "draft".to_string();

        let errors = v.validate_article(&article);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "published_at");
        assert_eq!(errors[0].message, "draft articles must not have published_at");
    }

    #[test]
    fn empty_status_defaults_silently() {
        let v = Validator::new();
        let mut article = valid_article();
        article.status = String::new();
        article.published_at = String::new();

        assert!(v.validate_article(&article).is_empty());
    }

    #[test]
    fn published_without_published_at_is_valid() {
        let v = Validator::new();
        let mut article = valid_article();
        article.published_at = String::new();

        assert!(v.validate_article(&article).is_empty());
    }

    #[test]
    fn fk_checked_only_when_cache_populated() {
        let mut article = valid_article();
        article.author_id = "99999999-9999-9999-9999-999999999999".to_string();

        // Empty cache: FK check skipped.
        let v = Validator::new();
        assert!(v.validate_article(&article).is_empty());

        // Populated cache without that id: FK violation.
        let mut v = Validator::new();
        v.set_user_id_cache(vec!["11111111-1111-1111-1111-111111111111".to_string()]);
        let errors = v.validate_article(&article);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "referenced user does not exist");
    }

    #[test]
    fn comment_fk_caches_checked_independently() {
        let mut v = Validator::new();
        v.set_user_id_cache(vec!["11111111-1111-1111-1111-111111111111".to_string()]);
        v.set_article_id_cache(vec!["22222222-2222-2222-2222-222222222222".to_string()]);

        let mut comment = valid_comment();
        comment.article_id = "44444444-4444-4444-4444-444444444444".to_string();

        let errors = v.validate_comment(&comment);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "article_id");
        assert_eq!(errors[0].message, "referenced article does not exist");
    }

    #[test]
    fn comment_id_accepts_cm_prefix() {
        let v = Validator::new();
        let mut comment = valid_comment();
        comment.id = "cm_abc123".to_string();
        assert!(v.validate_comment(&comment).is_empty());

        comment.id = "xyz".to_string();
        let errors = v.validate_comment(&comment);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "invalid ID format");
    }

    #[test]
    fn comment_body_word_count_boundary() {
        let v = Validator::new();

        let mut comment = valid_comment();
        comment.body = vec!["word"; 500].join(" ");
        assert!(v.validate_comment(&comment).is_empty());

        comment.body = vec!["word"; 501].join(" ");
        let errors = v.validate_comment(&comment);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "body");
        assert!(errors[0].message.contains("500"));
        assert!(errors[0].message.contains("501"));
    }

    #[test]
    fn word_count_uses_whitespace_runs() {
        let v = Validator::new();
        let mut comment = valid_comment();
        // Repeated and mixed whitespace collapses to one separator.
        comment.body = format!("{}  \t {}", "w ".repeat(499), "end");
        assert!(v.validate_comment(&comment).is_empty());
    }

    #[test]
    fn rfc3339_rejects_bare_dates() {
        let v = Validator::new();
        let mut user = valid_user();
        user.created_at = "2024-01-01".to_string();

        let errors = v.validate_user(&user);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "created_at");
        assert_eq!(errors[0].message, "invalid ISO 8601 date format");
    }

    #[test]
    fn rfc3339_accepts_offsets() {
        let v = Validator::new();
        let mut user = valid_user();
        user.created_at = "2024-01-01T12:30:00+02:00".to_string();
        assert!(v.validate_user(&user).is_empty());
    }
}
