//! BDE Common Library
//!
//! Shared functionality for the BDE workspace members. Currently this is the
//! centralized logging setup; every binary initializes `tracing` through
//! [`logging::init_logging`] so that log levels, formats, and filter
//! directives are configured the same way everywhere.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
