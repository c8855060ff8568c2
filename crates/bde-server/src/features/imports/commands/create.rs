//! Create import job command

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::models::{Job, Resource};
use crate::repository::Repositories;

/// Command to register a staged upload as a pending import job
#[derive(Debug, Clone)]
pub struct CreateImportCommand {
    pub resource: Resource,
    pub idempotency_key: Option<String>,
    pub staged_path: PathBuf,
}

/// Errors that can occur when creating an import job
#[derive(Debug, Error)]
pub enum CreateImportError {
    #[error("Failed to persist import job: {0}")]
    Repository(#[source] anyhow::Error),
}

#[tracing::instrument(skip(repos, command), fields(resource = %command.resource))]
pub async fn handle(
    repos: Arc<Repositories>,
    command: CreateImportCommand,
) -> Result<Job, CreateImportError> {
    let job = Job::new_import(
        command.resource,
        command.idempotency_key,
        command.staged_path,
    );

    match repos.jobs.create(&job).await {
        Ok(()) => {
            info!(
                job_id = %job.id,
                resource = %job.resource,
                file = %job.file_path.as_deref().unwrap_or_else(|| std::path::Path::new("")).display(),
                "Import job created"
            );
            Ok(job)
        }
        Err(e) => {
            // Two clients can race the advisory idempotency lookup; the
            // unique constraint decides, so re-query and hand back the
            // winner.
            if let Some(key) = &job.idempotency_key {
                if let Ok(Some(existing)) = repos.jobs.get_by_idempotency_key(key).await {
                    info!(
                        job_id = %existing.id,
                        "Returning existing job for idempotency key"
                    );
                    return Ok(existing);
                }
            }
            Err(CreateImportError::Repository(e))
        }
    }
}
