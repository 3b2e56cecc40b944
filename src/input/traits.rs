//! Input trait definitions
//!
//! Defines the error taxonomy and the interface a uinput backend must provide.

use std::fmt;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

use super::events::{EventKind, KeyCode};

/// Lifecycle state of a virtual device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceState {
    Unconfigured,
    Configured,
    Created,
    Destroyed,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceState::Unconfigured => "unconfigured",
            DeviceState::Configured => "configured",
            DeviceState::Created => "created",
            DeviceState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while driving the virtual device
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Cannot {operation} while device is {state}")]
    InvalidState {
        operation: &'static str,
        state: DeviceState,
    },

    #[error("Key {0} was not declared before the device was created")]
    UnsupportedKey(KeyCode),

    #[error("Partial write: {written} of {expected} bytes")]
    PartialWrite { written: usize, expected: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Default location of the uinput control node
pub const DEFAULT_UINPUT_NODE: &str = "/dev/uinput";

/// Bus type presented to host tooling (`BUS_*` from `input.h`)
pub const BUS_USB: u16 = 0x03;

/// Identity record installed at device creation
///
/// None of these values carry protocol meaning; they only show up in
/// host tooling such as `evtest` or `/proc/bus/input/devices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub bus_type: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
    pub name: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            bus_type: BUS_USB,
            vendor: 0x1234,
            product: 0x5678,
            version: 1,
            name: "Example device".to_string(),
        }
    }
}

/// Raw channel to the kernel virtual-input control interface
///
/// Writes go through the `Write` supertrait; each `write` call must map to
/// exactly one write on the node so that short writes stay visible.
pub trait UinputBackend: Write {
    /// Path of the control node this backend talks to
    fn node(&self) -> &Path;

    /// Open the control node
    fn open(&mut self) -> DeviceResult<()>;

    /// Enable an event kind (`UI_SET_EVBIT`)
    fn enable_event_kind(&mut self, kind: EventKind) -> DeviceResult<()>;

    /// Enable a key code (`UI_SET_KEYBIT`)
    fn enable_key(&mut self, code: KeyCode) -> DeviceResult<()>;

    /// Install the identity record (`UI_DEV_SETUP`)
    fn setup(&mut self, identity: &DeviceIdentity) -> DeviceResult<()>;

    /// Register the device with the kernel (`UI_DEV_CREATE`)
    fn create(&mut self) -> DeviceResult<()>;

    /// Unregister the device (`UI_DEV_DESTROY`)
    fn destroy(&mut self) -> DeviceResult<()>;

    /// Drop the handle, abandoning anything applied to it
    fn close(&mut self);
}
