//! Export routes
//!
//! `GET /?resource=...&format=...` streams the export body. A producer task
//! drives the repository cursor into a channel-backed sink while the
//! response body consumes it; a slow client therefore throttles the cursor.
//! Once bytes are on the wire there is no way to surface an error to the
//! client, so mid-stream failures end the body and are logged.

use crate::export::sink::ExportSink;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use crate::error::AppError;
use crate::export::{ChannelSink, ExportFormat};
use crate::features::FeatureState;
use crate::models::Resource;

/// Buffered body chunks in flight between producer and client.
const STREAM_CHANNEL_CAPACITY: usize = 16;

/// Create export routes
pub fn export_routes() -> Router<FeatureState> {
    Router::new().route("/", get(stream_export))
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    resource: Option<String>,
    format: Option<String>,
}

/// GET /v1/exports?resource=...&format=...
async fn stream_export(
    State(state): State<FeatureState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let resource = query
        .resource
        .filter(|r| !r.is_empty())
        .ok_or_else(|| {
            AppError::BadRequest(
                "resource parameter is required (users, articles, comments)".to_string(),
            )
        })?;
    let resource: Resource = resource.parse().map_err(|_| {
        AppError::BadRequest("resource must be one of: users, articles, comments".to_string())
    })?;

    // NDJSON is the default; it is the only format that streams without a
    // closing delimiter.
    let format: ExportFormat = query
        .format
        .as_deref()
        .filter(|f| !f.is_empty())
        .unwrap_or("ndjson")
        .parse()
        .map_err(|_| {
            AppError::BadRequest("format must be one of: ndjson, json, csv".to_string())
        })?;

    if format == ExportFormat::Csv && resource != Resource::Users {
        return Err(AppError::BadRequest(
            "CSV format only supported for users export".to_string(),
        ));
    }

    let (tx, rx) = tokio::sync::mpsc::channel(STREAM_CHANNEL_CAPACITY);
    let exports = state.exports.clone();
    tokio::spawn(async move {
        let mut sink = ChannelSink::new(tx);
        if let Err(e) = exports.stream(resource, format, &mut sink).await {
            error!(error = %e, resource = %resource, "Export failed");
            return;
        }
        if let Err(e) = sink.flush().await {
            debug!(error = %e, "Export consumer disconnected before final flush");
        }
    });

    let body = Body::from_stream(ReceiverStream::new(rx));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.content_type())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}.{}", resource, format),
        )
        .body(body)
        .map_err(|e| AppError::Internal(format!("failed to build export response: {}", e)))
}
