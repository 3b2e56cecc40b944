//! Script module - scripted key sequences
//!
//! Provides:
//! - Script steps, built-in fixtures and TOML script files
//! - The player that drives a key actuator through a script

mod player;
mod steps;

pub use player::ScriptPlayer;
pub use steps::*;
