//! Application-level errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading and querying category snapshots.
///
/// The domain layer is total, so every variant here comes from I/O,
/// document parsing, configuration or a lookup the user asked for.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("category source not found: {0}")]
    NotFound(PathBuf),

    #[error("no category source: {message}")]
    Source { message: String },

    #[error("cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
