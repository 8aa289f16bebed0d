//! CLI error type.

use std::fmt;

use tripsession::{ConfigError, TripSessionError};

/// Errors surfaced to the user by the `tripsession` binary.
#[derive(Debug)]
pub enum CliError {
    /// Bad arguments or configuration.
    Config(String),
    /// The session refused an input or failed to start.
    Session(String),
    /// Filesystem or terminal I/O failure.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Session(msg) => write!(f, "Session error: {}", msg),
            CliError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<TripSessionError> for CliError {
    fn from(e: TripSessionError) -> Self {
        CliError::Session(e.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            CliError::Session(_) | CliError::Io(_) => 1,
        }
    }
}
