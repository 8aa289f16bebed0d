//! CLI subcommands.

pub mod config;
pub mod simulate;

use std::path::Path;

use tripsession::TripSessionConfig;

use crate::error::CliError;

/// Load `path` if given, otherwise the built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<TripSessionConfig, CliError> {
    match path {
        Some(path) => Ok(TripSessionConfig::load(path)?),
        None => Ok(TripSessionConfig::default()),
    }
}
