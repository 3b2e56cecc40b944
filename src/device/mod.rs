//! Device module - the synthetic keyboard as the kernel sees it
//!
//! Provides:
//! - Capability staging before creation
//! - The event sink over the uinput channel
//! - The device lifecycle state machine

mod capabilities;
mod sink;
mod virtual_device;

pub use capabilities::*;
pub use virtual_device::*;
pub(crate) use virtual_device::pause;
