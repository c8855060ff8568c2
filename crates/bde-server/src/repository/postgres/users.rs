//! Postgres user repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::{PgPool, QueryBuilder};

use super::INSERT_CHUNK_ROWS;
use crate::models::User;
use crate::repository::{RowSink, UserRepository};

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn bulk_insert(&self, users: &[User]) -> Result<i64> {
        if users.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start transaction")?;

        for chunk in users.chunks(INSERT_CHUNK_ROWS) {
            let mut query_builder = QueryBuilder::new(
                "INSERT INTO users (id, email, name, role, active, created_at, updated_at) ",
            );
            query_builder.push_values(chunk, |mut b, user| {
                b.push_bind(&user.id)
                    .push_bind(&user.email)
                    .push_bind(&user.name)
                    .push_bind(&user.role)
                    .push_bind(user.active)
                    .push_bind(user.created_at)
                    .push_bind(user.updated_at);
            });

            query_builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to batch insert users")?;
        }

        tx.commit().await.context("Failed to commit transaction")?;

        Ok(users.len() as i64)
    }

    async fn ids(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>("SELECT id FROM users")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch user ids")
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")
    }

    async fn stream_all(&self, sink: &mut dyn RowSink<User>) -> Result<()> {
        let mut rows = sqlx::query_as::<_, User>(
            "SELECT id, email, name, role, active, created_at, updated_at \
             FROM users ORDER BY created_at",
        )
        .fetch(&self.pool);

        while let Some(user) = rows.try_next().await.context("Failed to stream users")? {
            sink.accept(user).await?;
        }

        Ok(())
    }
}
