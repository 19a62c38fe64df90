//! Common error types for biobooth

use thiserror::Error;

/// Common result type for biobooth operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the biobooth workspace
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Hardware transport could not be opened at startup (fatal)
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Pub/sub publish channel error
    #[error("Publish error: {0}")]
    Publish(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
