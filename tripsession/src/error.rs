//! Error types for the trip session engine.
//!
//! Each collaborator boundary has its own error enum. Per-tick failures
//! (positioning gaps, engine status failures, misbehaving observers) are
//! never surfaced through these types to API callers; the session logs and
//! counts them instead. Only operations that a caller can act on return
//! [`TripSessionError`].

use std::time::Duration;

use thiserror::Error;

/// Errors reported by the map-matching engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// The status call failed.
    #[error("Status request failed: {0}")]
    Status(String),

    /// The status call did not complete in time.
    #[error("Status request timed out after {0:?}")]
    Timeout(Duration),

    /// The engine could not accept a raw sample.
    #[error("Sample ingestion failed: {0}")]
    Ingest(String),

    /// The engine rejected a route update.
    #[error("Routes rejected: {0}")]
    RoutesRejected(String),
}

/// Errors reported by the positioning source.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PositioningError {
    /// The source produced an error instead of a sample.
    #[error("Positioning source failure: {0}")]
    Source(String),

    /// The source cannot deliver updates at all.
    #[error("Positioning source unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid INI.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A key holds a value that cannot be used.
    #[error("Invalid value for '{key}': {value}")]
    InvalidValue { key: String, value: String },
}

/// Errors returned by [`TripSession`](crate::session::TripSession) operations.
#[derive(Debug, Error)]
pub enum TripSessionError {
    /// Positioning updates could not be started.
    #[error(transparent)]
    Positioning(#[from] PositioningError),

    /// The engine refused an operation.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
