//! Asynchronous import subsystem
//!
//! [`pipeline::ImportPipeline`] consumes a staged file record by record;
//! [`drain::ErrorDrain`] keeps validation-error memory bounded;
//! [`scheduler::JobScheduler`] polls for pending jobs and runs pipelines
//! under a bounded worker budget with panic isolation.

pub mod drain;
pub mod pipeline;
pub mod scheduler;

pub use drain::ErrorDrain;
pub use pipeline::ImportPipeline;
pub use scheduler::JobScheduler;
