//! Jobs and validation errors
//!
//! A [`Job`] is one unit of asynchronous work. Imports carry a staged file
//! path and counters; the invariant `processed == successful + failed` holds
//! at every terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Status of an import/export job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the job has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(anyhow::anyhow!("unknown job status: {}", s)),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Import,
    Export,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Import => "import",
            JobKind::Export => "export",
        }
    }
}

impl FromStr for JobKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "import" => Ok(JobKind::Import),
            "export" => Ok(JobKind::Export),
            _ => Err(anyhow::anyhow!("unknown job kind: {}", s)),
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bulk-transferable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Users,
    Articles,
    Comments,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Users => "users",
            Resource::Articles => "articles",
            Resource::Comments => "comments",
        }
    }

    /// Whether an upload with this file extension can be imported as this
    /// resource (users come as CSV, articles/comments as NDJSON).
    pub fn accepts_extension(&self, ext: &str) -> bool {
        match self {
            Resource::Users => ext.eq_ignore_ascii_case("csv"),
            Resource::Articles | Resource::Comments => {
                ext.eq_ignore_ascii_case("ndjson") || ext.eq_ignore_ascii_case("json")
            }
        }
    }
}

impl FromStr for Resource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" => Ok(Resource::Users),
            "articles" => Ok(Resource::Articles),
            "comments" => Ok(Resource::Comments),
            _ => Err(anyhow::anyhow!(
                "resource must be one of: users, articles, comments"
            )),
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An import or export job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "job_id")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub resource: Resource,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(skip)]
    pub file_path: Option<PathBuf>,
    pub total_records: i64,
    #[serde(rename = "processed")]
    pub processed_count: i64,
    #[serde(rename = "successful")]
    pub successful_count: i64,
    #[serde(rename = "failed")]
    pub failed_count: i64,
    pub duration_ms: i64,
    pub rows_per_sec: f64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending import job for a staged file.
    pub fn new_import(
        resource: Resource,
        idempotency_key: Option<String>,
        file_path: PathBuf,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: JobKind::Import,
            resource,
            status: JobStatus::Pending,
            idempotency_key,
            file_path: Some(file_path),
            total_records: 0,
            processed_count: 0,
            successful_count: 0,
            failed_count: 0,
            duration_ms: 0,
            rows_per_sec: 0.0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// A single validation failure for one input record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub line: i64,
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// API response for job status: the job plus its leading validation errors
#[derive(Debug, Clone, Serialize)]
pub struct JobResponse {
    #[serde(flatten)]
    pub job: Job,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationError>,
    pub error_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_report_url: Option<String>,
}
