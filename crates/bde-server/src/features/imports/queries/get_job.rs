//! Job status query

use anyhow::Result;
use tracing::error;
use uuid::Uuid;

use crate::models::JobResponse;
use crate::repository::Repositories;

/// Leading validation errors embedded in the status response; the full
/// report is behind `error_report_url`.
const EMBEDDED_ERROR_LIMIT: i64 = 100;

pub async fn handle(repos: &Repositories, id: Uuid) -> Result<Option<JobResponse>> {
    let Some(job) = repos.jobs.get(id).await? else {
        return Ok(None);
    };

    // A failing error read degrades the response, it does not fail it.
    let errors = match repos.jobs.errors(id, EMBEDDED_ERROR_LIMIT).await {
        Ok(errors) => errors,
        Err(e) => {
            error!(error = ?e, job_id = %id, "Failed to get job errors");
            Vec::new()
        }
    };

    let error_report_url =
        (job.failed_count > 0).then(|| format!("/v1/imports/{}/errors", job.id));

    Ok(Some(JobResponse {
        error_count: job.failed_count,
        errors,
        error_report_url,
        job,
    }))
}
