//! Input module - wire-level access to the kernel input subsystem
//!
//! This module provides:
//! - The `input_event` record and Linux key code table
//! - The error taxonomy shared by the device layers
//! - Backends for the uinput control node (real and recording)

mod events;
mod recording;
mod traits;

#[cfg(target_os = "linux")]
mod linux;

// Re-export common types
pub use events::*;
pub use recording::*;
pub use traits::*;

// Re-export platform-specific implementations
#[cfg(target_os = "linux")]
pub use linux::LinuxUinput;

/// Get the current platform name
pub fn platform_name() -> &'static str {
    #[cfg(target_os = "linux")]
    return "Linux";

    #[cfg(not(target_os = "linux"))]
    return "Unsupported";
}

/// Whether this platform has a uinput backend
pub fn has_uinput() -> bool {
    cfg!(target_os = "linux")
}
