//! Live traffic blending for route congestion annotations.
//!
//! The [`TrafficCongestionSmoother`] rewrites the congestion values of the
//! leg the user is on using an estimate from a [`LiveTrafficSignal`],
//! one severity band at a time.

mod band;
mod boundary;
mod smoother;

pub use band::CongestionThresholds;
pub use boundary::access_controlled_exit;
pub use smoother::{
    SmootherConfig, SmoothingOutcome, TrafficCongestionSmoother, DEFAULT_FAR_SEGMENTS,
    DEFAULT_NEAR_SEGMENTS,
};

pub use crate::engine::LiveTrafficSignal;
