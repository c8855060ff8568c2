//! Postgres comment repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::{PgPool, QueryBuilder};

use super::INSERT_CHUNK_ROWS;
use crate::models::Comment;
use crate::repository::{CommentRepository, RowSink};

pub struct PgCommentRepository {
    pool: PgPool,
}

impl PgCommentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommentRepository for PgCommentRepository {
    async fn bulk_insert(&self, comments: &[Comment]) -> Result<i64> {
        if comments.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start transaction")?;

        for chunk in comments.chunks(INSERT_CHUNK_ROWS) {
            let mut query_builder = QueryBuilder::new(
                "INSERT INTO comments (id, article_id, user_id, body, created_at, updated_at) ",
            );
            query_builder.push_values(chunk, |mut b, comment| {
                b.push_bind(&comment.id)
                    .push_bind(&comment.article_id)
                    .push_bind(&comment.user_id)
                    .push_bind(&comment.body)
                    .push_bind(comment.created_at)
                    .push_bind(comment.updated_at);
            });

            query_builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to batch insert comments")?;
        }

        tx.commit().await.context("Failed to commit transaction")?;

        Ok(comments.len() as i64)
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count comments")
    }

    async fn stream_all(&self, sink: &mut dyn RowSink<Comment>) -> Result<()> {
        let mut rows = sqlx::query_as::<_, Comment>(
            "SELECT id, article_id, user_id, body, created_at, updated_at \
             FROM comments ORDER BY created_at",
        )
        .fetch(&self.pool);

        while let Some(comment) = rows.try_next().await.context("Failed to stream comments")? {
            sink.accept(comment).await?;
        }

        Ok(())
    }
}
