//! Import feature slice
//!
//! Accepts bulk upload files, stages them, and exposes job status and the
//! per-line validation error report.

pub mod commands;
pub mod queries;
mod routes;

pub use routes::import_routes;
