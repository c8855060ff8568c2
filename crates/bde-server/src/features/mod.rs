//! Feature modules implementing the BDE API
//!
//! Each feature is a vertical slice with its own commands, queries, and
//! routes:
//!
//! - **imports**: upload staging, job creation with idempotency, job status
//!   and error-report reads
//! - **exports**: streaming resource downloads
//!
//! Write operations live under `commands/`, reads under `queries/`, HTTP
//! wiring in `routes.rs`. Handlers call the `handle()` functions directly.

pub mod exports;
pub mod imports;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use std::sync::Arc;

use crate::config::Config;
use crate::export::ExportService;
use crate::repository::Repositories;

/// Multipart framing overhead allowed on top of the raw upload size.
const UPLOAD_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub repos: Arc<Repositories>,
    pub exports: ExportService,
    pub config: Arc<Config>,
}

impl FeatureState {
    pub fn new(repos: Arc<Repositories>, config: Arc<Config>) -> Self {
        Self {
            exports: ExportService::new(repos.clone()),
            repos,
            config,
        }
    }
}

/// Create the versioned API router with all feature routes mounted.
pub fn router(state: FeatureState) -> Router {
    let body_limit =
        DefaultBodyLimit::max(state.config.import.max_upload_size as usize + UPLOAD_OVERHEAD_BYTES);

    Router::new()
        .nest("/v1/imports", imports::import_routes())
        .nest("/v1/exports", exports::export_routes())
        .layer(body_limit)
        .with_state(state)
}
