//! Postgres article repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::{PgPool, QueryBuilder};

use super::INSERT_CHUNK_ROWS;
use crate::models::Article;
use crate::repository::{ArticleRepository, RowSink};

pub struct PgArticleRepository {
    pool: PgPool,
}

impl PgArticleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArticleRepository for PgArticleRepository {
    async fn bulk_insert(&self, articles: &[Article]) -> Result<i64> {
        if articles.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start transaction")?;

        for chunk in articles.chunks(INSERT_CHUNK_ROWS) {
            let mut query_builder = QueryBuilder::new(
                "INSERT INTO articles (id, slug, title, body, author_id, tags, status, \
                 published_at, created_at, updated_at) ",
            );
            query_builder.push_values(chunk, |mut b, article| {
                b.push_bind(&article.id)
                    .push_bind(&article.slug)
                    .push_bind(&article.title)
                    .push_bind(&article.body)
                    .push_bind(&article.author_id)
                    .push_bind(&article.tags)
                    .push_bind(&article.status)
                    .push_bind(article.published_at)
                    .push_bind(article.created_at)
                    .push_bind(article.updated_at);
            });

            query_builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to batch insert articles")?;
        }

        tx.commit().await.context("Failed to commit transaction")?;

        Ok(articles.len() as i64)
    }

    async fn ids(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>("SELECT id FROM articles")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch article ids")
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count articles")
    }

    async fn stream_all(&self, sink: &mut dyn RowSink<Article>) -> Result<()> {
        let mut rows = sqlx::query_as::<_, Article>(
            "SELECT id, slug, title, body, author_id, tags, status, published_at, \
             created_at, updated_at FROM articles ORDER BY created_at",
        )
        .fetch(&self.pool);

        while let Some(article) = rows.try_next().await.context("Failed to stream articles")? {
            sink.accept(article).await?;
        }

        Ok(())
    }
}
