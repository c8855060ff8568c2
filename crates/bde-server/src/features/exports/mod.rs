//! Export feature slice
//!
//! Streams whole resources to the client, row by row.

mod routes;

pub use routes::export_routes;
