//! Screenmux Common Utilities
//!
//! Shared infrastructure for all Screenmux crates:
//! - Error types and result aliases
//! - Clock, pacing, and stream time-base utilities
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
