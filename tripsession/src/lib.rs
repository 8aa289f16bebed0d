//! TripSession - live trip tracking core for turn-by-turn navigation
//!
//! This library turns a stream of raw position samples into map-matched
//! locations, route progress and a navigation phase, and fans them out to
//! registered observers. It also blends live congestion estimates into the
//! active route's annotations.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`session`] | `TripSession` lifecycle, inputs and queries |
//! | [`observer`] | Observer registries with replay-on-register |
//! | [`poller`] | Per-tick engine access and tick policies |
//! | [`phase`] | Navigation phase state machine |
//! | [`traffic`] | Congestion smoothing |
//! | [`engine`] | Collaborator traits plus simulated implementations |
//! | [`model`] | Data types shared by all of the above |

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod observer;
pub mod phase;
pub mod poller;
pub mod session;
pub mod traffic;

pub use config::TripSessionConfig;
pub use error::{ConfigError, EngineError, PositioningError, TripSessionError};
pub use session::TripSession;
