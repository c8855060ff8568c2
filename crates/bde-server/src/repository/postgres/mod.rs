//! PostgreSQL repository implementations
//!
//! Bulk writes go through `QueryBuilder` multi-row inserts inside a single
//! transaction per batch; reads for export go through server-side streaming
//! cursors so row count never affects memory.

use sqlx::PgPool;
use std::sync::Arc;

use super::Repositories;

mod articles;
mod comments;
mod jobs;
mod users;

pub use articles::PgArticleRepository;
pub use comments::PgCommentRepository;
pub use jobs::PgJobRepository;
pub use users::PgUserRepository;

/// Rows per INSERT statement inside a bulk transaction, kept well below the
/// Postgres bind-parameter limit (65535) at our widest row.
pub(crate) const INSERT_CHUNK_ROWS: usize = 1000;

/// Build the full Postgres repository set over one connection pool.
pub fn repositories(pool: PgPool) -> Repositories {
    Repositories {
        users: Arc::new(PgUserRepository::new(pool.clone())),
        articles: Arc::new(PgArticleRepository::new(pool.clone())),
        comments: Arc::new(PgCommentRepository::new(pool.clone())),
        jobs: Arc::new(PgJobRepository::new(pool)),
    }
}
