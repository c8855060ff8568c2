pub mod create;

pub use create::{CreateImportCommand, CreateImportError};
