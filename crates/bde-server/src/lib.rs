//! BDE Server Library
//!
//! HTTP server for bulk importing and exporting records (users, articles,
//! comments).
//!
//! # Overview
//!
//! - **Imports**: uploaded CSV/NDJSON files are staged on disk and processed
//!   asynchronously by a background scheduler. Files are read one record at a
//!   time, validated with cross-record uniqueness and foreign-key checks, and
//!   written in bounded batches, so memory stays constant regardless of file
//!   size. Validation failures never abort a job; every failure is recorded
//!   per line and retrievable afterwards.
//! - **Exports**: resources stream straight into the HTTP response body in
//!   NDJSON, JSON-array, or CSV form, one row at a time.
//! - **Jobs**: each import is a job row with counters
//!   (`processed == successful + failed` at every terminal state), timing
//!   metrics, and an optional idempotency key that makes client retries safe.
//!
//! # Architecture
//!
//! The HTTP layer lives in vertical feature slices under [`features`]; the
//! asynchronous core (pipeline, error drain, scheduler) lives under
//! [`ingest`]; storage access goes through the [`repository`] contracts so
//! the core never names a concrete database.
//!
//! ## Framework stack
//!
//! - **Axum** for the HTTP surface
//! - **SQLx** for PostgreSQL access and migrations
//! - **Tokio** tasks, semaphores, and cancellation tokens for the scheduler

pub mod config;
pub mod error;
pub mod export;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod validation;

// Re-export commonly used types
pub use error::{AppError, AppResult};
