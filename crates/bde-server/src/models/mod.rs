//! Domain models
//!
//! Storage-shaped records for each resource, the raw import-side record
//! shapes they are parsed from, and the job/validation-error types shared by
//! the pipeline, repositories, and API.

mod article;
mod comment;
mod job;
mod user;

pub use article::{Article, ArticleNdjsonRecord, ARTICLE_STATUSES};
pub use comment::{Comment, CommentNdjsonRecord, MAX_COMMENT_WORDS};
pub use job::{Job, JobKind, JobResponse, JobStatus, Resource, ValidationError};
pub use user::{User, UserCsvRecord, USER_ROLES};
