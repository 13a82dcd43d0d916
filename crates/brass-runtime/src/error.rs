//! Runtime error types.

use brass_core::TransportError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The transport refused the session.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The builder was finished without a transport.
    #[error("No transport configured")]
    MissingTransport,

    /// The runtime was stopped and cannot be started again.
    #[error("Runtime already stopped")]
    Stopped,

    /// Installing a signal handler failed.
    #[error("Failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
