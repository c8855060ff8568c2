//! Bounded validation-error buffer
//!
//! Validation errors accumulate here and are flushed to storage whenever the
//! buffer reaches its threshold, so heap use stays at roughly
//! `threshold x sizeof(error)` even when every row of a huge file is bad.

use tracing::error;
use uuid::Uuid;

use crate::models::ValidationError;
use crate::repository::JobRepository;
use crate::validation::FieldError;

/// Per-job buffer of validation errors with threshold-based flushing.
pub struct ErrorDrain {
    job_id: Uuid,
    threshold: usize,
    buf: Vec<ValidationError>,
}

impl ErrorDrain {
    pub fn new(job_id: Uuid, threshold: usize) -> Self {
        Self {
            job_id,
            threshold,
            buf: Vec::new(),
        }
    }

    /// Buffer every field error for one record at the given line.
    pub fn push_field_errors(&mut self, line: i64, errors: Vec<FieldError>) {
        for e in errors {
            self.buf.push(ValidationError {
                line,
                field: e.field.to_string(),
                message: e.message,
                value: e.value,
            });
        }
    }

    /// Buffer a single error (parse failures and the like).
    pub fn push(&mut self, error: ValidationError) {
        self.buf.push(error);
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.threshold
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append the buffered errors to storage and truncate the buffer,
    /// keeping its capacity. An append failure is logged and the buffer is
    /// dropped; record counters already reflect the failures.
    pub async fn flush(&mut self, jobs: &dyn JobRepository) {
        if self.buf.is_empty() {
            return;
        }
        if let Err(e) = jobs.append_errors(self.job_id, &self.buf).await {
            error!(
                error = ?e,
                count = self.buf.len(),
                "Failed to flush validation errors"
            );
        }
        self.buf.clear();
    }
}
