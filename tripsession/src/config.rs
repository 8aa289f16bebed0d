//! Session configuration and INI file loading.
//!
//! ```ini
//! [session]
//! ; event_driven or fixed_cadence
//! tick_policy = event_driven
//! ; fixed_cadence only
//! cadence_ms = 1000
//! status_timeout_ms = 2000
//!
//! [phase]
//! preview_destination_without_routes = false
//!
//! [traffic]
//! enabled = true
//! near_segments = 8
//! far_segments = 4
//! moderate = 40
//! heavy = 60
//! severe = 80
//!
//! [logging]
//! level = info
//! ; omit for stderr only
//! directory = /var/log/tripsession
//! ```
//!
//! Missing sections and keys fall back to defaults. Unknown keys are
//! ignored.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use tracing::debug;

use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use crate::phase::PhaseConfig;
use crate::poller::{PollerConfig, TickPolicy, DEFAULT_CADENCE};
use crate::traffic::{CongestionThresholds, SmootherConfig};

/// Complete configuration of a trip session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TripSessionConfig {
    /// Worker tick and engine call settings.
    pub poller: PollerConfig,
    /// Phase derivation options.
    pub phase: PhaseConfig,
    /// Live traffic smoothing.
    pub traffic: SmootherConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

impl TripSessionConfig {
    /// Set the worker settings.
    pub fn with_poller(mut self, poller: PollerConfig) -> Self {
        self.poller = poller;
        self
    }

    /// Set the phase options.
    pub fn with_phase(mut self, phase: PhaseConfig) -> Self {
        self.phase = phase;
        self
    }

    /// Set the smoothing settings.
    pub fn with_traffic(mut self, traffic: SmootherConfig) -> Self {
        self.traffic = traffic;
        self
    }

    /// Set the log output.
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Load configuration from an INI file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loading configuration");
        Self::from_ini_str(&text)
    }

    /// Parse configuration from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("session")) {
            let cadence = parse_millis(section, "session", "cadence_ms")?.unwrap_or(DEFAULT_CADENCE);
            if let Some(policy) = section.get("tick_policy") {
                config.poller.tick_policy = match policy.trim() {
                    "event_driven" => TickPolicy::EventDriven,
                    "fixed_cadence" => TickPolicy::FixedCadence(cadence),
                    other => return Err(invalid("session.tick_policy", other)),
                };
            }
            if let Some(timeout) = parse_millis(section, "session", "status_timeout_ms")? {
                config.poller.status_timeout = timeout;
            }
        }

        if let Some(section) = ini.section(Some("phase")) {
            if let Some(v) = parse(section, "phase", "preview_destination_without_routes")? {
                config.phase.preview_destination_without_routes = v;
            }
        }

        if let Some(section) = ini.section(Some("traffic")) {
            let t = &mut config.traffic;
            if let Some(v) = parse(section, "traffic", "enabled")? {
                t.enabled = v;
            }
            if let Some(v) = parse(section, "traffic", "near_segments")? {
                t.near_segments = v;
            }
            if let Some(v) = parse(section, "traffic", "far_segments")? {
                t.far_segments = v;
            }
            let defaults = CongestionThresholds::default();
            t.thresholds = CongestionThresholds::new(
                parse(section, "traffic", "moderate")?.unwrap_or(defaults.moderate),
                parse(section, "traffic", "heavy")?.unwrap_or(defaults.heavy),
                parse(section, "traffic", "severe")?.unwrap_or(defaults.severe),
            );
        }

        if let Some(section) = ini.section(Some("logging")) {
            if let Some(level) = section.get("level") {
                config.logging.level = level.trim().to_string();
            }
            if let Some(dir) = section.get("directory").map(str::trim).filter(|d| !d.is_empty()) {
                config.logging.directory = Some(PathBuf::from(dir));
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check every section for unusable values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.poller.validate()?;
        self.traffic.validate()
    }

    /// Render the configuration as INI text that [`from_ini_str`](Self::from_ini_str) accepts.
    pub fn to_ini_string(&self) -> String {
        let mut ini = Ini::new();
        let (policy, cadence) = match self.poller.tick_policy {
            TickPolicy::EventDriven => ("event_driven", DEFAULT_CADENCE),
            TickPolicy::FixedCadence(cadence) => ("fixed_cadence", cadence),
        };
        ini.with_section(Some("session"))
            .set("tick_policy", policy)
            .set("cadence_ms", cadence.as_millis().to_string())
            .set(
                "status_timeout_ms",
                self.poller.status_timeout.as_millis().to_string(),
            );
        ini.with_section(Some("phase")).set(
            "preview_destination_without_routes",
            self.phase.preview_destination_without_routes.to_string(),
        );
        let t = &self.traffic;
        ini.with_section(Some("traffic"))
            .set("enabled", t.enabled.to_string())
            .set("near_segments", t.near_segments.to_string())
            .set("far_segments", t.far_segments.to_string())
            .set("moderate", t.thresholds.moderate.to_string())
            .set("heavy", t.thresholds.heavy.to_string())
            .set("severe", t.thresholds.severe.to_string());
        let mut logging = ini.with_section(Some("logging"));
        logging.set("level", self.logging.level.clone());
        if let Some(dir) = &self.logging.directory {
            logging.set("directory", dir.display().to_string());
        }

        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = ini.write_to(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match section.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(&format!("{section_name}.{key}"), raw)),
    }
}

fn parse_millis(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> Result<Option<Duration>, ConfigError> {
    Ok(parse::<u64>(section, section_name, key)?.map(Duration::from_millis))
}
