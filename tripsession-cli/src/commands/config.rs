//! Configuration file commands.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Subcommand;
use tripsession::TripSessionConfig;

use super::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as INI
    Show,
    /// Write a configuration file with default values
    Init {
        /// Destination file
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check a configuration file without running anything
    Check,
}

/// Run a config subcommand.
pub fn run(config_path: Option<&Path>, action: ConfigAction) -> Result<(), CliError> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            print!("{}", config.to_ini_string());
            Ok(())
        }
        ConfigAction::Init { path, force } => {
            if path.exists() && !force {
                return Err(CliError::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, TripSessionConfig::default().to_ini_string())?;
            println!("Configuration file: {}", path.display());
            Ok(())
        }
        ConfigAction::Check => {
            let Some(path) = config_path else {
                return Err(CliError::Config(
                    "config check needs --config <FILE>".to_string(),
                ));
            };
            TripSessionConfig::load(path)?;
            println!("{}: ok", path.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_loadable_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("tripsession.ini");

        run(None, ConfigAction::Init { path: path.clone(), force: false }).unwrap();

        let loaded = TripSessionConfig::load(&path).unwrap();
        assert_eq!(loaded, TripSessionConfig::default());
    }

    #[test]
    fn test_init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tripsession.ini");
        fs::write(&path, "[session]\n").unwrap();

        let err = run(None, ConfigAction::Init { path: path.clone(), force: false }).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "[session]\n");

        run(None, ConfigAction::Init { path: path.clone(), force: true }).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("[traffic]"));
    }

    #[test]
    fn test_check_requires_a_file() {
        assert!(matches!(
            run(None, ConfigAction::Check),
            Err(CliError::Config(_))
        ));
    }
}
