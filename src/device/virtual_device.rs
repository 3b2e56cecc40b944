//! Virtual device lifecycle
//!
//! Unconfigured -> Configured -> Created -> Destroyed, with no way back.
//! Events can only be emitted while the device is Created.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use super::capabilities::{CapabilityRegistrar, DeclaredKey, DeviceCapabilities};
use super::sink::EventSink;
use crate::input::{
    DeviceError, DeviceIdentity, DeviceResult, DeviceState, EventKind, KeyCode, UinputBackend,
};

/// External timing contracts of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Wait after creation so host consumers can discover the device
    pub settle: Duration,
    /// Wait before destruction so host consumers can read the last events
    pub drain: Duration,
    /// Settling interval for emissions that request a sleep
    pub step: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            drain: Duration::from_secs(2),
            step: Duration::from_millis(200),
        }
    }
}

impl Timing {
    /// No waiting at all, for dry runs and tests
    pub fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            drain: Duration::ZERO,
            step: Duration::ZERO,
        }
    }
}

pub(crate) fn pause(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

fn active_nodes() -> &'static Mutex<HashSet<PathBuf>> {
    static ACTIVE: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    ACTIVE.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Marks a device node as owned by a live session until dropped
#[derive(Debug)]
struct NodeClaim(PathBuf);

impl NodeClaim {
    fn acquire(node: &Path) -> DeviceResult<Self> {
        let mut nodes = active_nodes().lock().unwrap_or_else(|e| e.into_inner());
        if !nodes.insert(node.to_path_buf()) {
            return Err(DeviceError::InvalidState {
                operation: "create a second device on an active node",
                state: DeviceState::Created,
            });
        }
        Ok(Self(node.to_path_buf()))
    }
}

impl Drop for NodeClaim {
    fn drop(&mut self) {
        let mut nodes = active_nodes().lock().unwrap_or_else(|e| e.into_inner());
        nodes.remove(&self.0);
    }
}

static NEXT_DEVICE: AtomicU64 = AtomicU64::new(0);

/// A synthetic input device registered through a uinput backend
pub struct VirtualDevice<B: UinputBackend> {
    id: u64,
    backend: B,
    identity: DeviceIdentity,
    timing: Timing,
    registrar: CapabilityRegistrar,
    state: DeviceState,
    claim: Option<NodeClaim>,
}

impl<B: UinputBackend> VirtualDevice<B> {
    pub fn new(backend: B, identity: DeviceIdentity, timing: Timing) -> Self {
        Self {
            id: NEXT_DEVICE.fetch_add(1, Ordering::Relaxed),
            backend,
            identity,
            timing,
            registrar: CapabilityRegistrar::new(),
            state: DeviceState::Unconfigured,
            claim: None,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn node(&self) -> &Path {
        self.backend.node()
    }

    /// Declared capabilities; frozen once the device is created
    pub fn capabilities(&self) -> &DeviceCapabilities {
        self.registrar.staged()
    }

    pub fn supports_key(&self, code: KeyCode) -> bool {
        self.capabilities().contains_key(code)
    }

    /// Handle for a declared key; `UnsupportedKey` otherwise
    pub fn key(&self, code: KeyCode) -> DeviceResult<DeclaredKey> {
        if self.supports_key(code) {
            Ok(DeclaredKey::new(code, self.id))
        } else {
            Err(DeviceError::UnsupportedKey(code))
        }
    }

    /// Whether `key` was handed out by this device
    pub fn owns(&self, key: DeclaredKey) -> bool {
        key.device() == self.id
    }

    /// Fail with `InvalidState` unless the device is in `expected`
    pub fn require_state(&self, expected: DeviceState, operation: &'static str) -> DeviceResult<()> {
        if self.state != expected {
            return Err(DeviceError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn require_configurable(&self, operation: &'static str) -> DeviceResult<()> {
        match self.state {
            DeviceState::Unconfigured | DeviceState::Configured => Ok(()),
            state => Err(DeviceError::InvalidState { operation, state }),
        }
    }

    /// Apply a staged set of declarations
    pub fn configure(&mut self, registrar: CapabilityRegistrar) -> DeviceResult<()> {
        self.require_configurable("configure capabilities")?;
        self.registrar.absorb(registrar);
        self.state = DeviceState::Configured;
        Ok(())
    }

    pub fn declare_event_type(&mut self, kind: EventKind) -> DeviceResult<()> {
        self.require_configurable("declare an event type")?;
        self.registrar.declare_event_type(kind);
        self.state = DeviceState::Configured;
        Ok(())
    }

    pub fn declare_key(&mut self, code: KeyCode) -> DeviceResult<()> {
        self.require_configurable("declare a key")?;
        self.registrar.declare_key(code);
        self.state = DeviceState::Configured;
        Ok(())
    }

    /// Register the device with the kernel
    ///
    /// On failure the handle is closed, abandoning every declaration already
    /// applied to it, and the device ends up Destroyed.
    pub fn create(&mut self) -> DeviceResult<()> {
        self.require_state(DeviceState::Configured, "create")?;
        if !self.capabilities().is_creatable() {
            return Err(DeviceError::InvalidState {
                operation: "create without at least one event type and one key",
                state: self.state,
            });
        }

        let claim = NodeClaim::acquire(self.backend.node())?;

        if let Err(e) = self.register() {
            tracing::error!("Failed to create device on {}: {}", self.node().display(), e);
            self.backend.close();
            self.state = DeviceState::Destroyed;
            return Err(e);
        }

        self.claim = Some(claim);
        self.state = DeviceState::Created;
        tracing::info!(
            "Created '{}' ({:04x}:{:04x}) with {} keys on {}",
            self.identity.name,
            self.identity.vendor,
            self.identity.product,
            self.capabilities().key_count(),
            self.node().display()
        );

        tracing::debug!("created, sleeping...");
        pause(self.timing.settle);
        tracing::debug!("awake...");
        Ok(())
    }

    fn register(&mut self) -> DeviceResult<()> {
        self.backend.open()?;
        let caps = self.registrar.staged();
        for kind in caps.kinds() {
            self.backend.enable_event_kind(kind)?;
        }
        for key in caps.keys() {
            self.backend.enable_key(key)?;
        }
        self.backend.setup(&self.identity)?;
        self.backend.create()
    }

    /// Write one event record
    pub fn emit(&mut self, kind: EventKind, code: u16, value: i32) -> DeviceResult<()> {
        self.require_state(DeviceState::Created, "emit events")?;
        EventSink::new(&mut self.backend).emit(kind, code, value)
    }

    /// Unregister the device after the drain delay
    pub fn destroy(&mut self) -> DeviceResult<()> {
        self.require_state(DeviceState::Created, "destroy")?;

        tracing::debug!("all written, sleeping...");
        pause(self.timing.drain);
        tracing::debug!("awake, destroying...");

        let result = self.backend.destroy();
        self.backend.close();
        self.claim = None;
        self.state = DeviceState::Destroyed;

        match &result {
            Ok(()) => tracing::info!("Destroyed '{}'", self.identity.name),
            Err(e) => tracing::error!("Failed to destroy '{}': {}", self.identity.name, e),
        }
        result
    }
}

impl<B: UinputBackend> Drop for VirtualDevice<B> {
    fn drop(&mut self) {
        if self.state == DeviceState::Created {
            tracing::warn!("Device '{}' dropped while created, destroying", self.identity.name);
            if let Err(e) = self.backend.destroy() {
                tracing::error!("Failed to destroy '{}': {}", self.identity.name, e);
            }
            self.backend.close();
            self.state = DeviceState::Destroyed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::keycodes::*;
    use crate::input::{FailurePlan, KeyState, RecordedCall, RecordingBackend, SYN_REPORT};
    use std::thread;
    use std::time::Instant;

    fn device(backend: RecordingBackend) -> VirtualDevice<RecordingBackend> {
        VirtualDevice::new(backend, DeviceIdentity::default(), Timing::immediate())
    }

    fn configured(backend: RecordingBackend) -> VirtualDevice<RecordingBackend> {
        let mut dev = device(backend);
        let mut registrar = CapabilityRegistrar::new();
        registrar
            .declare_event_type(EventKind::Key)
            .declare_event_type(EventKind::Sync)
            .declare_key(KEY_A)
            .declare_key(KEY_LEFTSHIFT);
        dev.configure(registrar).unwrap();
        dev
    }

    #[test]
    fn test_lifecycle() {
        let backend = RecordingBackend::new();
        let journal = backend.journal();
        let mut dev = configured(backend);
        assert_eq!(dev.state(), DeviceState::Configured);

        dev.create().unwrap();
        assert_eq!(dev.state(), DeviceState::Created);
        dev.emit(EventKind::Key, KEY_A.code(), KeyState::Pressed as i32)
            .unwrap();
        dev.emit(EventKind::Sync, SYN_REPORT, 0).unwrap();
        dev.destroy().unwrap();
        assert_eq!(dev.state(), DeviceState::Destroyed);

        let calls = journal.calls();
        assert_eq!(calls.first(), Some(&RecordedCall::Open));
        assert!(calls.contains(&RecordedCall::EnableKey(KEY_A)));
        assert!(calls.contains(&RecordedCall::Setup(DeviceIdentity::default())));
        let create = calls.iter().position(|c| *c == RecordedCall::Create).unwrap();
        let last_key = calls
            .iter()
            .rposition(|c| matches!(c, RecordedCall::EnableKey(_)))
            .unwrap();
        assert!(last_key < create);
        assert_eq!(
            &calls[calls.len() - 2..],
            &[RecordedCall::Destroy, RecordedCall::Close]
        );
        assert_eq!(journal.events().len(), 2);
    }

    #[test]
    fn test_emit_outside_created_state() {
        let backend = RecordingBackend::new();
        let journal = backend.journal();
        let mut dev = configured(backend);

        assert!(matches!(
            dev.emit(EventKind::Sync, SYN_REPORT, 0),
            Err(DeviceError::InvalidState { .. })
        ));
        dev.create().unwrap();
        dev.destroy().unwrap();
        assert!(matches!(
            dev.emit(EventKind::Sync, SYN_REPORT, 0),
            Err(DeviceError::InvalidState {
                state: DeviceState::Destroyed,
                ..
            })
        ));
        assert!(journal.events().is_empty());
    }

    #[test]
    fn test_declare_after_create() {
        let mut dev = configured(RecordingBackend::new());
        dev.create().unwrap();
        assert!(matches!(
            dev.declare_key(KEY_B),
            Err(DeviceError::InvalidState {
                state: DeviceState::Created,
                ..
            })
        ));
        assert!(matches!(
            dev.declare_event_type(EventKind::Key),
            Err(DeviceError::InvalidState { .. })
        ));
        assert!(!dev.supports_key(KEY_B));
    }

    #[test]
    fn test_create_requires_declarations() {
        let mut dev = device(RecordingBackend::new());
        assert!(matches!(
            dev.create(),
            Err(DeviceError::InvalidState {
                state: DeviceState::Unconfigured,
                ..
            })
        ));

        dev.declare_key(KEY_A).unwrap();
        assert!(matches!(
            dev.create(),
            Err(DeviceError::InvalidState { .. })
        ));
        assert_eq!(dev.state(), DeviceState::Configured);

        dev.declare_event_type(EventKind::Key).unwrap();
        dev.create().unwrap();
    }

    #[test]
    fn test_destroy_twice() {
        let mut dev = configured(RecordingBackend::new());
        dev.create().unwrap();
        dev.destroy().unwrap();
        assert!(matches!(
            dev.destroy(),
            Err(DeviceError::InvalidState {
                state: DeviceState::Destroyed,
                ..
            })
        ));
    }

    #[test]
    fn test_open_failure_is_unavailable() {
        let backend = RecordingBackend::new().with_failures(FailurePlan {
            open: true,
            ..Default::default()
        });
        let mut dev = configured(backend);
        assert!(matches!(
            dev.create(),
            Err(DeviceError::DeviceUnavailable(_))
        ));
        assert_eq!(dev.state(), DeviceState::Destroyed);
    }

    #[test]
    fn test_rejected_key_abandons_handle() {
        let backend = RecordingBackend::new().with_failures(FailurePlan {
            reject_key: Some(KEY_LEFTSHIFT),
            ..Default::default()
        });
        let journal = backend.journal();
        let node = backend.node().to_path_buf();
        let mut dev = configured(backend);

        assert!(matches!(
            dev.create(),
            Err(DeviceError::DeviceUnavailable(_))
        ));
        assert_eq!(dev.state(), DeviceState::Destroyed);
        let calls = journal.calls();
        assert!(!calls.contains(&RecordedCall::Create));
        assert_eq!(calls.last(), Some(&RecordedCall::Close));

        // The node is free again.
        let mut other = configured(RecordingBackend::with_node(node));
        other.create().unwrap();
    }

    #[test]
    fn test_create_ioctl_failure_abandons_handle() {
        let backend = RecordingBackend::new().with_failures(FailurePlan {
            create: true,
            ..Default::default()
        });
        let journal = backend.journal();
        let node = backend.node().to_path_buf();
        let mut dev = configured(backend);

        assert!(matches!(
            dev.create(),
            Err(DeviceError::DeviceUnavailable(_))
        ));
        assert_eq!(dev.state(), DeviceState::Destroyed);

        let calls = journal.calls();
        // Every declaration went through before the create call failed.
        assert!(calls.contains(&RecordedCall::EnableKey(KEY_A)));
        assert!(calls.contains(&RecordedCall::EnableKey(KEY_LEFTSHIFT)));
        assert!(calls.contains(&RecordedCall::Setup(DeviceIdentity::default())));
        assert!(!calls.contains(&RecordedCall::Create));
        assert!(!calls.contains(&RecordedCall::Destroy));
        assert_eq!(calls.last(), Some(&RecordedCall::Close));

        assert!(matches!(
            dev.emit(EventKind::Sync, SYN_REPORT, 0),
            Err(DeviceError::InvalidState { .. })
        ));
        assert!(journal.events().is_empty());

        let mut other = configured(RecordingBackend::with_node(node));
        other.create().unwrap();
    }

    #[test]
    fn test_settle_follows_create_and_drain_precedes_destroy() {
        let delay = Duration::from_millis(150);
        let timing = Timing {
            settle: delay,
            drain: delay,
            step: Duration::ZERO,
        };
        let backend = RecordingBackend::new();
        let journal = backend.journal();
        let mut dev = VirtualDevice::new(backend, DeviceIdentity::default(), timing);
        dev.configure(CapabilityRegistrar::keyboard()).unwrap();

        let observer = journal.clone();
        let watcher = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            observer.calls()
        });
        let start = Instant::now();
        dev.create().unwrap();
        assert!(start.elapsed() >= delay);
        let during_settle = watcher.join().unwrap();
        assert_eq!(during_settle.last(), Some(&RecordedCall::Create));

        dev.emit(EventKind::Sync, SYN_REPORT, 0).unwrap();

        let observer = journal.clone();
        let watcher = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            observer.calls()
        });
        let start = Instant::now();
        dev.destroy().unwrap();
        assert!(start.elapsed() >= delay);
        let during_drain = watcher.join().unwrap();
        assert!(!during_drain.contains(&RecordedCall::Destroy));
        assert!(matches!(during_drain.last(), Some(RecordedCall::Event(_))));

        let calls = journal.calls();
        assert_eq!(
            &calls[calls.len() - 2..],
            &[RecordedCall::Destroy, RecordedCall::Close]
        );
    }

    #[test]
    fn test_key_handles() {
        let mut dev = configured(RecordingBackend::new());
        let a = dev.key(KEY_A).unwrap();
        assert_eq!(a.code(), KEY_A);
        assert!(dev.owns(a));
        assert!(matches!(
            dev.key(KEY_B),
            Err(DeviceError::UnsupportedKey(KEY_B))
        ));

        // A handle minted before creation stays valid afterwards.
        dev.create().unwrap();
        assert!(dev.owns(a));

        let other = configured(RecordingBackend::new());
        assert!(!other.owns(a));
        assert_ne!(other.key(KEY_A).unwrap(), a);
    }

    #[test]
    fn test_one_session_per_node() {
        let first = RecordingBackend::new();
        let node = first.node().to_path_buf();
        let mut a = configured(first);
        a.create().unwrap();

        let mut b = configured(RecordingBackend::with_node(node.clone()));
        assert!(matches!(
            b.create(),
            Err(DeviceError::InvalidState { .. })
        ));
        assert_eq!(b.state(), DeviceState::Configured);

        a.destroy().unwrap();
        let mut c = configured(RecordingBackend::with_node(node));
        c.create().unwrap();
    }

    #[test]
    fn test_drop_destroys_created_device() {
        let backend = RecordingBackend::new();
        let journal = backend.journal();
        {
            let mut dev = configured(backend);
            dev.create().unwrap();
        }
        let calls = journal.calls();
        assert_eq!(
            &calls[calls.len() - 2..],
            &[RecordedCall::Destroy, RecordedCall::Close]
        );
    }

    #[test]
    fn test_partial_write_surfaces() {
        let backend = RecordingBackend::new().with_failures(FailurePlan {
            short_write_at: Some(0),
            ..Default::default()
        });
        let mut dev = configured(backend);
        dev.create().unwrap();
        assert!(matches!(
            dev.emit(EventKind::Key, KEY_A.code(), 1),
            Err(DeviceError::PartialWrite { .. })
        ));
        assert_eq!(dev.state(), DeviceState::Created);
    }
}
