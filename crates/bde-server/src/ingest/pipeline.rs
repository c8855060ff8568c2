//! Streaming import pipeline
//!
//! Consumes a staged file one record at a time: parse, validate (updating
//! the per-job caches), batch, bulk-insert, drain errors. Record-level
//! failures never abort the job; only structural faults (unreadable file,
//! over-long line, cancellation) do. On every exit path the counters satisfy
//! `processed == successful + failed`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::drain::ErrorDrain;
use crate::config::ImportConfig;
use crate::models::{
    Article, ArticleNdjsonRecord, Comment, CommentNdjsonRecord, Job, JobStatus, Resource, User,
    UserCsvRecord, ValidationError,
};
use crate::repository::Repositories;
use crate::validation::Validator;

/// Initial NDJSON line buffer; grows up to [`MAX_LINE_BYTES`].
const LINE_BUFFER_CAPACITY: usize = 64 * 1024;

/// Hard cap on one NDJSON line; longer lines fail the whole stream.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Processes import jobs against the repository contracts.
pub struct ImportPipeline {
    repos: Arc<Repositories>,
    config: ImportConfig,
}

impl ImportPipeline {
    pub fn new(repos: Arc<Repositories>, config: ImportConfig) -> Self {
        Self { repos, config }
    }

    /// Run one import job to completion.
    ///
    /// Blocks until the file is fully consumed or a structural error occurs;
    /// the terminal job row (status, counters, metrics) is persisted before
    /// returning. The returned error is the structural fault, if any.
    pub async fn process(&self, job: &mut Job, cancel: &CancellationToken) -> Result<()> {
        let start = Instant::now();
        job.status = JobStatus::Processing;
        if job.started_at.is_none() {
            job.started_at = Some(Utc::now());
        }
        if let Err(e) = self.repos.jobs.update(job).await {
            warn!(error = ?e, job_id = %job.id, "Failed to persist processing status");
        }

        info!(
            job_id = %job.id,
            resource = %job.resource,
            "Starting import processing"
        );

        let result = match job.resource {
            Resource::Users => self.process_users_csv(job, cancel).await,
            Resource::Articles => self.process_articles_ndjson(job, cancel).await,
            Resource::Comments => self.process_comments_ndjson(job, cancel).await,
        };

        let elapsed = start.elapsed();
        job.duration_ms = elapsed.as_millis() as i64;
        job.rows_per_sec = if job.processed_count > 0 && elapsed.as_secs_f64() > 0.0 {
            job.processed_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        job.completed_at = Some(Utc::now());

        match &result {
            Ok(()) => {
                job.status = JobStatus::Completed;
                let error_rate_pct = if job.total_records > 0 {
                    job.failed_count as f64 / job.total_records as f64 * 100.0
                } else {
                    0.0
                };
                info!(
                    job_id = %job.id,
                    total = job.total_records,
                    successful = job.successful_count,
                    failed = job.failed_count,
                    error_rate_pct,
                    duration_ms = job.duration_ms,
                    rows_per_sec = job.rows_per_sec,
                    "Import completed"
                );
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                error!(error = %e, job_id = %job.id, "Import failed");
            }
        }

        if let Err(e) = self.repos.jobs.update(job).await {
            error!(error = ?e, job_id = %job.id, "Failed to persist terminal job state");
        }

        result
    }

    fn staged_path(job: &Job) -> Result<PathBuf> {
        job.file_path
            .clone()
            .context("import job has no staged file")
    }

    async fn process_users_csv(&self, job: &mut Job, cancel: &CancellationToken) -> Result<()> {
        let path = Self::staged_path(job)?;
        let file = std::fs::File::open(&path)
            .with_context(|| format!("failed to open staged file {}", path.display()))?;

        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut validator = Validator::new();
        let mut drain = ErrorDrain::new(job.id, self.config.error_flush_threshold);
        let batch_size = self.config.batch_size;
        let mut batch: Vec<User> = Vec::with_capacity(batch_size);

        let mut records = reader.into_records();

        // Header row: build a case-insensitive column -> index map. A file
        // without even a header counts as empty.
        let header_map: HashMap<String, usize> = match records.next() {
            Some(row) => row
                .context("failed to read CSV header")?
                .iter()
                .enumerate()
                .map(|(i, h)| (h.trim().to_lowercase(), i))
                .collect(),
            None => return Ok(()),
        };

        let mut line_num: i64 = 1; // header
        let mut stream_err: Option<anyhow::Error> = None;

        for row in records {
            let row = match row {
                Ok(row) => row,
                Err(e) if e.is_io_error() => {
                    stream_err = Some(anyhow::Error::new(e).context("CSV stream failed"));
                    break;
                }
                // Malformed rows are skipped at the parser level; missing
                // required fields would only resurface as "required" errors.
                Err(_) => continue,
            };
            line_num += 1;
            job.total_records += 1;

            if line_num % self.config.cancel_checkpoint_rows as i64 == 0 && cancel.is_cancelled() {
                drain.flush(self.repos.jobs.as_ref()).await;
                anyhow::bail!("import cancelled");
            }

            let record = UserCsvRecord {
                id: field(&row, &header_map, "id"),
                email: field(&row, &header_map, "email"),
                name: field(&row, &header_map, "name"),
                role: field(&row, &header_map, "role"),
                active: field(&row, &header_map, "active"),
                created_at: field(&row, &header_map, "created_at"),
                updated_at: field(&row, &header_map, "updated_at"),
            };

            let errors = validator.validate_user(&record);
            if !errors.is_empty() {
                job.failed_count += 1;
                job.processed_count += 1;
                drain.push_field_errors(line_num, errors);
                if drain.is_full() {
                    drain.flush(self.repos.jobs.as_ref()).await;
                }
                continue;
            }

            validator.add_user_email(&record.email);
            validator.add_user_id(&record.id);
            batch.push(user_from_csv(record));

            if batch.len() >= batch_size {
                self.insert_users(job, &mut batch).await;
            }
        }

        if !batch.is_empty() {
            self.insert_users(job, &mut batch).await;
        }
        drain.flush(self.repos.jobs.as_ref()).await;

        match stream_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn process_articles_ndjson(
        &self,
        job: &mut Job,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let path = Self::staged_path(job)?;
        let file = std::fs::File::open(&path)
            .with_context(|| format!("failed to open staged file {}", path.display()))?;
        let mut reader = std::io::BufReader::with_capacity(LINE_BUFFER_CAPACITY, file);

        let mut validator = Validator::new();

        // Pre-load user ids for FK validation unless the set is too large.
        let user_ids = self.repos.users.ids().await.unwrap_or_else(|e| {
            warn!(error = ?e, "Failed to preload user ids for FK validation");
            Vec::new()
        });
        if user_ids.len() < self.config.max_fk_cache_size {
            validator.set_user_id_cache(user_ids);
        }

        let mut drain = ErrorDrain::new(job.id, self.config.error_flush_threshold);
        let batch_size = self.config.batch_size;
        let mut batch: Vec<Article> = Vec::with_capacity(batch_size);

        let mut line = String::with_capacity(LINE_BUFFER_CAPACITY);
        let mut line_num: i64 = 0;
        let mut stream_err: Option<anyhow::Error> = None;

        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    stream_err =
                        Some(anyhow::Error::new(e).context("failed to read staged file"));
                    break;
                }
            }
            line_num += 1;

            if line.len() > MAX_LINE_BYTES {
                stream_err = Some(anyhow::anyhow!(
                    "line {} exceeds maximum length of {} bytes",
                    line_num,
                    MAX_LINE_BYTES
                ));
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            job.total_records += 1;

            if line_num % self.config.cancel_checkpoint_rows as i64 == 0 && cancel.is_cancelled() {
                drain.flush(self.repos.jobs.as_ref()).await;
                anyhow::bail!("import cancelled");
            }

            let record: ArticleNdjsonRecord = match serde_json::from_str(trimmed) {
                Ok(record) => record,
                Err(e) => {
                    job.failed_count += 1;
                    job.processed_count += 1;
                    drain.push(ValidationError {
                        line: line_num,
                        field: "json".to_string(),
                        message: format!("invalid JSON: {}", e),
                        value: None,
                    });
                    if drain.is_full() {
                        drain.flush(self.repos.jobs.as_ref()).await;
                    }
                    continue;
                }
            };

            let errors = validator.validate_article(&record);
            if !errors.is_empty() {
                job.failed_count += 1;
                job.processed_count += 1;
                drain.push_field_errors(line_num, errors);
                if drain.is_full() {
                    drain.flush(self.repos.jobs.as_ref()).await;
                }
                continue;
            }

            validator.add_article_slug(&record.slug);
            validator.add_article_id(&record.id);
            batch.push(article_from_ndjson(record));

            if batch.len() >= batch_size {
                self.insert_articles(job, &mut batch).await;
            }
        }

        if !batch.is_empty() {
            self.insert_articles(job, &mut batch).await;
        }
        drain.flush(self.repos.jobs.as_ref()).await;

        match stream_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn process_comments_ndjson(
        &self,
        job: &mut Job,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let path = Self::staged_path(job)?;
        let file = std::fs::File::open(&path)
            .with_context(|| format!("failed to open staged file {}", path.display()))?;
        let mut reader = std::io::BufReader::with_capacity(LINE_BUFFER_CAPACITY, file);

        let mut validator = Validator::new();

        let user_ids = self.repos.users.ids().await.unwrap_or_else(|e| {
            warn!(error = ?e, "Failed to preload user ids for FK validation");
            Vec::new()
        });
        if user_ids.len() < self.config.max_fk_cache_size {
            validator.set_user_id_cache(user_ids);
        }
        let article_ids = self.repos.articles.ids().await.unwrap_or_else(|e| {
            warn!(error = ?e, "Failed to preload article ids for FK validation");
            Vec::new()
        });
        if article_ids.len() < self.config.max_fk_cache_size {
            validator.set_article_id_cache(article_ids);
        }

        let mut drain = ErrorDrain::new(job.id, self.config.error_flush_threshold);
        let batch_size = self.config.batch_size;
        let mut batch: Vec<Comment> = Vec::with_capacity(batch_size);

        let mut line = String::with_capacity(LINE_BUFFER_CAPACITY);
        let mut line_num: i64 = 0;
        let mut stream_err: Option<anyhow::Error> = None;

        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    stream_err =
                        Some(anyhow::Error::new(e).context("failed to read staged file"));
                    break;
                }
            }
            line_num += 1;

            if line.len() > MAX_LINE_BYTES {
                stream_err = Some(anyhow::anyhow!(
                    "line {} exceeds maximum length of {} bytes",
                    line_num,
                    MAX_LINE_BYTES
                ));
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            job.total_records += 1;

            if line_num % self.config.cancel_checkpoint_rows as i64 == 0 && cancel.is_cancelled() {
                drain.flush(self.repos.jobs.as_ref()).await;
                anyhow::bail!("import cancelled");
            }

            let record: CommentNdjsonRecord = match serde_json::from_str(trimmed) {
                Ok(record) => record,
                Err(e) => {
                    job.failed_count += 1;
                    job.processed_count += 1;
                    drain.push(ValidationError {
                        line: line_num,
                        field: "json".to_string(),
                        message: format!("invalid JSON: {}", e),
                        value: None,
                    });
                    if drain.is_full() {
                        drain.flush(self.repos.jobs.as_ref()).await;
                    }
                    continue;
                }
            };

            let errors = validator.validate_comment(&record);
            if !errors.is_empty() {
                job.failed_count += 1;
                job.processed_count += 1;
                drain.push_field_errors(line_num, errors);
                if drain.is_full() {
                    drain.flush(self.repos.jobs.as_ref()).await;
                }
                continue;
            }

            batch.push(comment_from_ndjson(record));

            if batch.len() >= batch_size {
                self.insert_comments(job, &mut batch).await;
            }
        }

        if !batch.is_empty() {
            self.insert_comments(job, &mut batch).await;
        }
        drain.flush(self.repos.jobs.as_ref()).await;

        match stream_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Insert one batch; a failed insert counts the whole batch as failed
    /// and the pipeline continues. `processed` advances either way.
    async fn insert_users(&self, job: &mut Job, batch: &mut Vec<User>) {
        match self.repos.users.bulk_insert(batch).await {
            Ok(inserted) => job.successful_count += inserted,
            Err(e) => {
                error!(error = ?e, batch_size = batch.len(), "Batch insert failed");
                job.failed_count += batch.len() as i64;
            }
        }
        job.processed_count += batch.len() as i64;
        debug!(job_id = %job.id, processed = job.processed_count, "Batch processed");
        batch.clear();
    }

    async fn insert_articles(&self, job: &mut Job, batch: &mut Vec<Article>) {
        match self.repos.articles.bulk_insert(batch).await {
            Ok(inserted) => job.successful_count += inserted,
            Err(e) => {
                error!(error = ?e, batch_size = batch.len(), "Batch insert failed");
                job.failed_count += batch.len() as i64;
            }
        }
        job.processed_count += batch.len() as i64;
        debug!(job_id = %job.id, processed = job.processed_count, "Batch processed");
        batch.clear();
    }

    async fn insert_comments(&self, job: &mut Job, batch: &mut Vec<Comment>) {
        match self.repos.comments.bulk_insert(batch).await {
            Ok(inserted) => job.successful_count += inserted,
            Err(e) => {
                error!(error = ?e, batch_size = batch.len(), "Batch insert failed");
                job.failed_count += batch.len() as i64;
            }
        }
        job.processed_count += batch.len() as i64;
        debug!(job_id = %job.id, processed = job.processed_count, "Batch processed");
        batch.clear();
    }
}

/// Look up a column by (lowercased) header name; absent columns and short
/// rows yield the empty string.
fn field(row: &csv::StringRecord, header_map: &HashMap<String, usize>, name: &str) -> String {
    header_map
        .get(name)
        .and_then(|&idx| row.get(idx))
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Timestamps reaching the converters have already passed validation.
fn parse_instant(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn user_from_csv(record: UserCsvRecord) -> User {
    let now = Utc::now();
    User {
        created_at: parse_instant(&record.created_at),
        updated_at: now,
        id: record.id,
        email: record.email,
        name: record.name,
        role: record.role,
        active: record.active == "true",
    }
}

fn article_from_ndjson(record: ArticleNdjsonRecord) -> Article {
    let now = Utc::now();
    Article {
        status: if record.status.is_empty() {
            "draft".to_string()
        } else {
            record.status
        },
        published_at: if record.published_at.is_empty() {
            None
        } else {
            Some(parse_instant(&record.published_at))
        },
        created_at: now,
        updated_at: now,
        id: record.id,
        slug: record.slug,
        title: record.title,
        body: record.body,
        author_id: record.author_id,
        tags: record.tags,
    }
}

fn comment_from_ndjson(record: CommentNdjsonRecord) -> Comment {
    Comment {
        created_at: parse_instant(&record.created_at),
        updated_at: Utc::now(),
        id: record.id,
        article_id: record.article_id,
        user_id: record.user_id,
        body: record.body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_field_lookup_tolerates_missing_columns() {
        let row = csv::StringRecord::from(vec!["a", "b"]);
        let mut header_map = HashMap::new();
        header_map.insert("id".to_string(), 0);
        header_map.insert("email".to_string(), 1);
        header_map.insert("name".to_string(), 7);

        assert_eq!(field(&row, &header_map, "id"), "a");
        assert_eq!(field(&row, &header_map, "email"), "b");
        // Column index beyond the row and column not in the header.
        assert_eq!(field(&row, &header_map, "name"), "");
        assert_eq!(field(&row, &header_map, "role"), "");
    }

    #[test]
    fn user_conversion_parses_active_and_timestamps() {
        let user = user_from_csv(UserCsvRecord {
            id: "11111111-1111-1111-1111-111111111111".to_string(),
            email: "a@x.io".to_string(),
            name: "A".to_string(),
            role: "admin".to_string(),
            active: "true".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: String::new(),
        });

        assert!(user.active);
        assert_eq!(user.created_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");

        let inactive = user_from_csv(UserCsvRecord {
            active: String::new(),
            ..UserCsvRecord::default()
        });
        assert!(!inactive.active);
    }

    #[test]
    fn article_conversion_defaults_empty_status_to_draft() {
        let article = article_from_ndjson(ArticleNdjsonRecord {
            id: "x".to_string(),
            slug: "s".to_string(),
            ..Default::default()
        });
        assert_eq!(article.status, "draft");
        assert!(article.published_at.is_none());

        let published = article_from_ndjson(ArticleNdjsonRecord {
            status: "published".to_string(),
            published_at: "2024-01-01T00:00:00Z".to_string(),
            ..Default::default()
        });
        assert_eq!(published.status, "published");
        assert!(published.published_at.is_some());
    }
}
