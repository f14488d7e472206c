// src/error.rs

use thiserror::Error;

/// Core error types for Steward
#[derive(Error, Debug)]
pub enum Error {
    /// Channels failed to reload (network fetch or index parse failure)
    #[error("Failed to reload channels: {0}")]
    Channel(String),

    /// A transaction could not be performed (infeasible, held, or the
    /// apply step failed); carries human-readable diagnostic text
    #[error("{0}")]
    Transaction(String),

    /// The resolver's plan exceeds what the caller marked; carries the
    /// versions that were pulled in without being requested
    #[error("Missing dependencies: {}", .0.join(", "))]
    Dependency(Vec<String>),

    /// Operation unavailable on the active backend variant
    #[error("Operation not supported by this backend: {0}")]
    NotSupported(&'static str),

    /// Host state database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using Steward's Error type
pub type Result<T> = std::result::Result<T, Error>;
