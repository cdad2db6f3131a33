//! Error types for Capsule

use nix::errno::Errno;
use thiserror::Error;

/// Capsule error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The isolated child could not be created
    #[error("Cannot clone due to error code {}: {errno}", errno_code(.errno))]
    Spawn {
        /// Error reported by clone(2)
        errno: Errno,
    },

    /// Namespace operation failed
    #[error("Namespace error: {message}")]
    Namespace {
        /// Error message
        message: String,
    },

    /// A namespace or root filesystem bootstrap step failed
    #[error("Bootstrap failed at {step}: {message}")]
    Bootstrap {
        /// Name of the failing step
        step: String,
        /// Error message
        message: String,
    },

    /// Network attachment or configuration failed
    #[error("Network error: {message}")]
    Network {
        /// Error message
        message: String,
    },

    /// The host/child handshake broke down
    #[error("Handshake error: {message}")]
    Handshake {
        /// Error message
        message: String,
    },

    /// The target command could not be executed
    #[error("Failed to execute {command}: {errno}")]
    Exec {
        /// Command that was attempted
        command: String,
        /// Error reported by execvp(3)
        errno: Errno,
    },

    /// Permission denied
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// Operation that was denied
        operation: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// System error from nix
    #[error("System error: {0}")]
    System(#[from] nix::Error),
}

impl Error {
    /// Shorthand for a [`Error::Bootstrap`] at the given step
    pub fn bootstrap(step: impl ToString, message: impl ToString) -> Self {
        Self::Bootstrap {
            step: step.to_string(),
            message: message.to_string(),
        }
    }

    /// Shorthand for a [`Error::Network`]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::InvalidConfig`]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

const fn errno_code(errno: &Errno) -> i32 {
    *errno as i32
}

/// Result type alias for Capsule operations
pub type Result<T> = std::result::Result<T, Error>;
