//! Full error report query

use anyhow::Result;
use uuid::Uuid;

use crate::models::ValidationError;
use crate::repository::Repositories;

/// All stored validation errors for a job, in insertion order.
pub async fn handle(repos: &Repositories, id: Uuid) -> Result<Vec<ValidationError>> {
    repos.jobs.errors(id, 0).await
}
