//! Postgres job repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use std::path::PathBuf;
use uuid::Uuid;

use super::INSERT_CHUNK_ROWS;
use crate::models::{Job, ValidationError};
use crate::repository::JobRepository;

const JOB_COLUMNS: &str = "id, kind, resource, status, idempotency_key, file_path, \
     total_records, processed_count, successful_count, failed_count, \
     duration_ms, rows_per_sec, created_at, started_at, completed_at";

pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Raw row shape; enums and paths are stored as text.
#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    kind: String,
    resource: String,
    status: String,
    idempotency_key: Option<String>,
    file_path: Option<String>,
    total_records: i64,
    processed_count: i64,
    successful_count: i64,
    failed_count: i64,
    duration_ms: i64,
    rows_per_sec: f64,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = anyhow::Error;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(Job {
            id: row.id,
            kind: row.kind.parse()?,
            resource: row.resource.parse()?,
            status: row.status.parse()?,
            idempotency_key: row.idempotency_key,
            file_path: row.file_path.map(PathBuf::from),
            total_records: row.total_records,
            processed_count: row.processed_count,
            successful_count: row.successful_count,
            failed_count: row.failed_count,
            duration_ms: row.duration_ms,
            rows_per_sec: row.rows_per_sec,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

fn path_to_text(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.to_string_lossy().into_owned())
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn create(&self, job: &Job) -> Result<()> {
        sqlx::query(
            "INSERT INTO jobs (id, kind, resource, status, idempotency_key, file_path, \
             total_records, processed_count, successful_count, failed_count, \
             duration_ms, rows_per_sec, created_at, started_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(job.id)
        .bind(job.kind.as_str())
        .bind(job.resource.as_str())
        .bind(job.status.as_str())
        .bind(&job.idempotency_key)
        .bind(path_to_text(&job.file_path))
        .bind(job.total_records)
        .bind(job.processed_count)
        .bind(job.successful_count)
        .bind(job.failed_count)
        .bind(job.duration_ms)
        .bind(job.rows_per_sec)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .context("Failed to create job")?;

        Ok(())
    }

    async fn update(&self, job: &Job) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = $1, total_records = $2, processed_count = $3, \
             successful_count = $4, failed_count = $5, duration_ms = $6, rows_per_sec = $7, \
             started_at = $8, completed_at = $9 WHERE id = $10",
        )
        .bind(job.status.as_str())
        .bind(job.total_records)
        .bind(job.processed_count)
        .bind(job.successful_count)
        .bind(job.failed_count)
        .bind(job.duration_ms)
        .bind(job.rows_per_sec)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.id)
        .execute(&self.pool)
        .await
        .context("Failed to update job")?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch job")?;

        row.map(Job::try_from).transpose()
    }

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch job by idempotency key")?;

        row.map(Job::try_from).transpose()
    }

    async fn list_pending(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = 'pending' \
             ORDER BY created_at FOR UPDATE SKIP LOCKED"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch pending jobs")?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn claim_pending(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'processing', started_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to claim pending job")?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_errors(&self, job_id: Uuid, errors: &[ValidationError]) -> Result<()> {
        if errors.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start transaction")?;

        for chunk in errors.chunks(INSERT_CHUNK_ROWS) {
            let mut query_builder = QueryBuilder::new(
                "INSERT INTO job_errors (job_id, line_number, field, message, value) ",
            );
            query_builder.push_values(chunk, |mut b, error| {
                b.push_bind(job_id)
                    .push_bind(error.line)
                    .push_bind(&error.field)
                    .push_bind(&error.message)
                    .push_bind(&error.value);
            });

            query_builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to batch insert job errors")?;
        }

        tx.commit().await.context("Failed to commit transaction")?;

        Ok(())
    }

    async fn errors(&self, job_id: Uuid, limit: i64) -> Result<Vec<ValidationError>> {
        // Insertion order; within one job that is ascending line order.
        let rows: Vec<(i64, String, String, Option<String>)> = if limit > 0 {
            sqlx::query_as(
                "SELECT line_number, field, message, value FROM job_errors \
                 WHERE job_id = $1 ORDER BY id LIMIT $2",
            )
            .bind(job_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as(
                "SELECT line_number, field, message, value FROM job_errors \
                 WHERE job_id = $1 ORDER BY id",
            )
            .bind(job_id)
            .fetch_all(&self.pool)
            .await
        }
        .context("Failed to fetch job errors")?;

        Ok(rows
            .into_iter()
            .map(|(line, field, message, value)| ValidationError {
                line,
                field,
                message,
                value,
            })
            .collect())
    }
}
