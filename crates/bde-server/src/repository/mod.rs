//! Repository contracts
//!
//! The import/export core talks to storage exclusively through these traits;
//! it never names a concrete database. The contracts the core relies on:
//!
//! - `bulk_insert` is atomic per call: either the whole batch lands or none
//!   of it does. Partial success is never reported.
//! - `stream_all` feeds rows one at a time, in creation order, into a
//!   [`RowSink`]; a sink error terminates the stream. Memory use is O(1) in
//!   the row count.
//! - `claim_pending` is exclusive: for any job, exactly one caller observes
//!   `true`.
//! - `append_errors` is append-only and order-preserving.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Article, Comment, Job, User, ValidationError};

pub mod memory;
pub mod postgres;

/// Row-at-a-time consumer for streaming reads.
///
/// Returning an error stops the stream; the error propagates to the
/// `stream_all` caller.
#[async_trait]
pub trait RowSink<T>: Send {
    async fn accept(&mut self, row: T) -> Result<()>;
}

/// Data operations for users
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a batch atomically, returning the number of rows written.
    async fn bulk_insert(&self, users: &[User]) -> Result<i64>;
    /// All user ids, for FK cache preloading.
    async fn ids(&self) -> Result<Vec<String>>;
    async fn count(&self) -> Result<i64>;
    /// Stream every user in creation order into `sink`.
    async fn stream_all(&self, sink: &mut dyn RowSink<User>) -> Result<()>;
}

/// Data operations for articles
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    async fn bulk_insert(&self, articles: &[Article]) -> Result<i64>;
    async fn ids(&self) -> Result<Vec<String>>;
    async fn count(&self) -> Result<i64>;
    async fn stream_all(&self, sink: &mut dyn RowSink<Article>) -> Result<()>;
}

/// Data operations for comments
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn bulk_insert(&self, comments: &[Comment]) -> Result<i64>;
    async fn count(&self) -> Result<i64>;
    async fn stream_all(&self, sink: &mut dyn RowSink<Comment>) -> Result<()>;
}

/// Data operations for jobs and their validation errors
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &Job) -> Result<()>;
    async fn update(&self, job: &Job) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Job>>;
    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<Job>>;
    /// Pending jobs in creation order, skipping rows another scheduler holds.
    async fn list_pending(&self) -> Result<Vec<Job>>;
    /// Atomically flip `pending -> processing`. Returns whether this caller
    /// won the transition.
    async fn claim_pending(&self, id: Uuid) -> Result<bool>;
    /// Append validation errors, preserving order.
    async fn append_errors(&self, job_id: Uuid, errors: &[ValidationError]) -> Result<()>;
    /// Stored errors in insertion order; `limit = 0` means all.
    async fn errors(&self, job_id: Uuid, limit: i64) -> Result<Vec<ValidationError>>;
}

/// All repositories behind one handle
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub articles: Arc<dyn ArticleRepository>,
    pub comments: Arc<dyn CommentRepository>,
    pub jobs: Arc<dyn JobRepository>,
}
