//! Import routes
//!
//! `POST /` accepts a multipart upload, stages it, and queues a pending job
//! (202). A matching `Idempotency-Key` short-circuits to the prior job with
//! 200 before anything is staged. `GET /:job_id` returns status plus the
//! first hundred validation errors; `GET /:job_id/errors` returns the whole
//! report as JSON or CSV.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{error, info};
use uuid::Uuid;

use super::commands::{self, CreateImportCommand};
use super::queries;
use crate::error::AppError;
use crate::features::FeatureState;
use crate::models::{Resource, ValidationError};

/// Create import routes
pub fn import_routes() -> Router<FeatureState> {
    Router::new()
        .route("/", post(create_import))
        .route("/:job_id", get(get_import_status))
        .route("/:job_id/errors", get(get_import_errors))
}

/// POST /v1/imports
///
/// Multipart fields: `resource` (or the `resource` query parameter) and
/// `file`. Validation happens before the upload is staged.
async fn create_import(
    State(state): State<FeatureState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    // Idempotent replay: a known key returns the prior job without staging
    // a new file.
    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    if let Some(key) = &idempotency_key {
        match state.repos.jobs.get_by_idempotency_key(key).await {
            Ok(Some(existing)) => {
                info!(job_id = %existing.id, "Returning existing job for idempotency key");
                return Ok((StatusCode::OK, Json(existing)).into_response());
            }
            Ok(None) => {}
            Err(e) => error!(error = ?e, "Failed to check idempotency key"),
        }
    }

    let mut resource_field: Option<String> = None;
    let mut upload: Option<(String, axum::body::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart payload: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "resource" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("invalid resource field: {}", e)))?;
                resource_field = Some(value);
            }
            "file" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("failed to read upload: {}", e)))?;
                upload = Some((filename, data));
            }
            _ => {}
        }
    }

    let resource = resource_field
        .filter(|r| !r.is_empty())
        .or_else(|| params.get("resource").cloned())
        .ok_or_else(|| {
            AppError::BadRequest(
                "resource parameter is required (users, articles, comments)".to_string(),
            )
        })?;
    let resource: Resource = resource.parse().map_err(|_| {
        AppError::BadRequest("resource must be one of: users, articles, comments".to_string())
    })?;

    let (filename, data) =
        upload.ok_or_else(|| AppError::BadRequest("file upload is required".to_string()))?;

    if data.len() as u64 > state.config.import.max_upload_size {
        return Err(AppError::BadRequest(format!(
            "file too large, max size is {} MB",
            state.config.import.max_upload_size / (1024 * 1024)
        )));
    }

    let ext = std::path::Path::new(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if !resource.accepts_extension(&ext) {
        let message = match resource {
            Resource::Users => "users import requires CSV file",
            Resource::Articles | Resource::Comments => {
                "articles/comments import requires NDJSON file"
            }
        };
        return Err(AppError::BadRequest(message.to_string()));
    }

    // Stage the upload under a collision-free name.
    let upload_dir = &state.config.import.upload_dir;
    tokio::fs::create_dir_all(upload_dir).await.map_err(|e| {
        error!(error = ?e, "Failed to create upload directory");
        AppError::Internal("failed to save file".to_string())
    })?;

    let staged_name = format!(
        "{}_{}.{}",
        resource,
        &Uuid::new_v4().simple().to_string()[..8],
        ext
    );
    let staged_path = upload_dir.join(staged_name);
    tokio::fs::write(&staged_path, &data).await.map_err(|e| {
        error!(error = ?e, path = %staged_path.display(), "Failed to write staged file");
        AppError::Internal("failed to save file".to_string())
    })?;

    let command = CreateImportCommand {
        resource,
        idempotency_key,
        staged_path,
    };
    let job = commands::create::handle(state.repos.clone(), command)
        .await
        .map_err(|e| {
            error!(error = ?e, "Failed to create import job");
            AppError::Internal("failed to create import job".to_string())
        })?;

    info!(
        job_id = %job.id,
        resource = %resource,
        file = %filename,
        size_bytes = data.len(),
        "Import job accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "job_id": job.id,
            "status": job.status,
            "resource": job.resource,
            "message": "Import job created and queued for processing",
        })),
    )
        .into_response())
}

/// GET /v1/imports/:job_id
async fn get_import_status(
    State(state): State<FeatureState>,
    Path(job_id): Path<String>,
) -> Result<Response, AppError> {
    let id = Uuid::parse_str(&job_id)
        .map_err(|_| AppError::NotFound("job not found".to_string()))?;

    let response = queries::get_job::handle(&state.repos, id)
        .await
        .map_err(|e| {
            error!(error = ?e, job_id = %id, "Failed to get job");
            AppError::Internal("failed to get job status".to_string())
        })?
        .ok_or_else(|| AppError::NotFound("job not found".to_string()))?;

    Ok((StatusCode::OK, Json(response)).into_response())
}

#[derive(Debug, Deserialize)]
struct ErrorsQuery {
    format: Option<String>,
}

/// GET /v1/imports/:job_id/errors?format=json|csv
async fn get_import_errors(
    State(state): State<FeatureState>,
    Path(job_id): Path<String>,
    Query(query): Query<ErrorsQuery>,
) -> Result<Response, AppError> {
    let id = Uuid::parse_str(&job_id)
        .map_err(|_| AppError::NotFound("job not found".to_string()))?;

    let errors = queries::get_errors::handle(&state.repos, id)
        .await
        .map_err(|e| {
            error!(error = ?e, job_id = %id, "Failed to get job errors");
            AppError::Internal("failed to get errors".to_string())
        })?;

    match query.format.as_deref().unwrap_or("json") {
        "csv" => {
            let body = errors_to_csv(&errors)
                .map_err(|e| AppError::Internal(format!("failed to render CSV: {}", e)))?;
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=errors_{}.csv", id),
                    ),
                ],
                body,
            )
                .into_response())
        }
        _ => Ok((
            StatusCode::OK,
            Json(json!({
                "job_id": id,
                "error_count": errors.len(),
                "errors": errors,
            })),
        )
            .into_response()),
    }
}

fn errors_to_csv(errors: &[ValidationError]) -> anyhow::Result<String> {
    let mut buf = Vec::new();
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut buf);
        writer.write_record(["line", "field", "message", "value"])?;
        for e in errors {
            writer.write_record([
                e.line.to_string().as_str(),
                e.field.as_str(),
                e.message.as_str(),
                e.value.as_deref().unwrap_or(""),
            ])?;
        }
        writer.flush()?;
    }
    Ok(String::from_utf8(buf)?)
}
