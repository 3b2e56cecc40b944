//! Capability declarations
//!
//! Everything a virtual device may ever emit has to be declared before the
//! device is created; the kernel refuses new capability bits afterwards.

use std::collections::BTreeSet;

use crate::input::{default_keyboard_keys, EventKind, KeyCode};

/// Event kinds and key codes a device supports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    kinds: BTreeSet<EventKind>,
    keys: BTreeSet<KeyCode>,
}

impl DeviceCapabilities {
    pub fn contains_kind(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn contains_key(&self, code: KeyCode) -> bool {
        self.keys.contains(&code)
    }

    pub fn kinds(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.kinds.iter().copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = KeyCode> + '_ {
        self.keys.iter().copied()
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// A device needs at least one event kind and one key to be created
    pub fn is_creatable(&self) -> bool {
        !self.kinds.is_empty() && !self.keys.is_empty()
    }

    fn merge(&mut self, other: DeviceCapabilities) {
        self.kinds.extend(other.kinds);
        self.keys.extend(other.keys);
    }
}

/// A key code checked against the declarations of one device
///
/// Only `VirtualDevice::key` hands these out, and only for keys the device
/// declared. Declarations are never withdrawn, so a handle stays valid for
/// the life of its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclaredKey {
    code: KeyCode,
    device: u64,
}

impl DeclaredKey {
    pub(super) fn new(code: KeyCode, device: u64) -> Self {
        Self { code, device }
    }

    pub fn code(self) -> KeyCode {
        self.code
    }

    pub(super) fn device(self) -> u64 {
        self.device
    }
}

/// Stages capability declarations for a device that does not exist yet
///
/// Holds no device handle; `VirtualDevice::configure` applies the staged
/// set, and `VirtualDevice::create` pushes it to the kernel in one go.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistrar {
    staged: DeviceCapabilities,
}

impl CapabilityRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// KEY and SYNC plus the default keyboard key set
    pub fn keyboard() -> Self {
        let mut registrar = Self::new();
        registrar
            .declare_event_type(EventKind::Key)
            .declare_event_type(EventKind::Sync)
            .declare_keys(default_keyboard_keys());
        registrar
    }

    pub fn declare_event_type(&mut self, kind: EventKind) -> &mut Self {
        self.staged.kinds.insert(kind);
        self
    }

    pub fn declare_key(&mut self, code: KeyCode) -> &mut Self {
        self.staged.keys.insert(code);
        self
    }

    pub fn declare_keys(&mut self, codes: impl IntoIterator<Item = KeyCode>) -> &mut Self {
        self.staged.keys.extend(codes);
        self
    }

    pub fn staged(&self) -> &DeviceCapabilities {
        &self.staged
    }

    pub(crate) fn absorb(&mut self, other: CapabilityRegistrar) {
        self.staged.merge(other.staged);
    }
}
