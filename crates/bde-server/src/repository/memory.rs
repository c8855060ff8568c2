//! In-memory repository implementations
//!
//! Back the test suites with the same contracts as the Postgres
//! implementations, including the behaviors the core depends on: atomic
//! claim transitions, idempotency-key uniqueness, and order-preserving
//! error append.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{
    ArticleRepository, CommentRepository, JobRepository, Repositories, RowSink, UserRepository,
};
use crate::models::{Article, Comment, Job, JobStatus, User, ValidationError};

/// Build a full in-memory repository set.
pub fn repositories() -> Repositories {
    Repositories {
        users: Arc::new(MemoryUserRepository::default()),
        articles: Arc::new(MemoryArticleRepository::default()),
        comments: Arc::new(MemoryCommentRepository::default()),
        jobs: Arc::new(MemoryJobRepository::default()),
    }
}

#[derive(Default)]
pub struct MemoryUserRepository {
    rows: Mutex<Vec<User>>,
}

impl MemoryUserRepository {
    pub fn with_rows(rows: Vec<User>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn bulk_insert(&self, users: &[User]) -> Result<i64> {
        self.rows.lock().unwrap().extend_from_slice(users);
        Ok(users.len() as i64)
    }

    async fn ids(&self) -> Result<Vec<String>> {
        Ok(self.rows.lock().unwrap().iter().map(|u| u.id.clone()).collect())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.rows.lock().unwrap().len() as i64)
    }

    async fn stream_all(&self, sink: &mut dyn RowSink<User>) -> Result<()> {
        let rows = self.rows.lock().unwrap().clone();
        for row in rows {
            sink.accept(row).await?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryArticleRepository {
    rows: Mutex<Vec<Article>>,
}

impl MemoryArticleRepository {
    pub fn with_rows(rows: Vec<Article>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }
}

#[async_trait]
impl ArticleRepository for MemoryArticleRepository {
    async fn bulk_insert(&self, articles: &[Article]) -> Result<i64> {
        self.rows.lock().unwrap().extend_from_slice(articles);
        Ok(articles.len() as i64)
    }

    async fn ids(&self) -> Result<Vec<String>> {
        Ok(self.rows.lock().unwrap().iter().map(|a| a.id.clone()).collect())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.rows.lock().unwrap().len() as i64)
    }

    async fn stream_all(&self, sink: &mut dyn RowSink<Article>) -> Result<()> {
        let rows = self.rows.lock().unwrap().clone();
        for row in rows {
            sink.accept(row).await?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCommentRepository {
    rows: Mutex<Vec<Comment>>,
}

impl MemoryCommentRepository {
    pub fn with_rows(rows: Vec<Comment>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }
}

#[async_trait]
impl CommentRepository for MemoryCommentRepository {
    async fn bulk_insert(&self, comments: &[Comment]) -> Result<i64> {
        self.rows.lock().unwrap().extend_from_slice(comments);
        Ok(comments.len() as i64)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.rows.lock().unwrap().len() as i64)
    }

    async fn stream_all(&self, sink: &mut dyn RowSink<Comment>) -> Result<()> {
        let rows = self.rows.lock().unwrap().clone();
        for row in rows {
            sink.accept(row).await?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryJobRepository {
    jobs: Mutex<Vec<Job>>,
    errors: Mutex<HashMap<Uuid, Vec<ValidationError>>>,
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn create(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        // The unique constraint on idempotency_key is the source of truth.
        if let Some(key) = &job.idempotency_key {
            if jobs.iter().any(|j| j.idempotency_key.as_ref() == Some(key)) {
                anyhow::bail!("duplicate idempotency key: {}", key);
            }
        }
        jobs.push(job.clone());
        Ok(())
    }

    async fn update(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => anyhow::bail!("job not found: {}", job.id),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned())
    }

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<Job>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn list_pending(&self) -> Result<Vec<Job>> {
        let mut pending: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|j| j.created_at);
        Ok(pending)
    }

    async fn claim_pending(&self, id: Uuid) -> Result<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.iter_mut().find(|j| j.id == id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Processing;
                job.started_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_errors(&self, job_id: Uuid, errors: &[ValidationError]) -> Result<()> {
        self.errors
            .lock()
            .unwrap()
            .entry(job_id)
            .or_default()
            .extend_from_slice(errors);
        Ok(())
    }

    async fn errors(&self, job_id: Uuid, limit: i64) -> Result<Vec<ValidationError>> {
        let errors = self.errors.lock().unwrap();
        let stored = errors.get(&job_id).cloned().unwrap_or_default();
        if limit > 0 {
            Ok(stored.into_iter().take(limit as usize).collect())
        } else {
            Ok(stored)
        }
    }
}
