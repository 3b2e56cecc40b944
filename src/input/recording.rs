//! In-memory uinput backend
//!
//! Journals every call a virtual device makes instead of touching the
//! kernel. Used for `--dry-run` and throughout the tests; failures can be
//! injected to exercise the error paths.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::events::{EventKind, EventRecord, KeyCode};
use super::traits::{DeviceError, DeviceIdentity, DeviceResult, UinputBackend};

/// One call observed by the recording backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Open,
    EnableEventKind(EventKind),
    EnableKey(KeyCode),
    Setup(DeviceIdentity),
    Create,
    Destroy,
    Close,
    Event(EventRecord),
}

/// Shared view of everything a recording backend saw
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<RecordedCall>>>);

impl Journal {
    fn lock(&self) -> MutexGuard<'_, Vec<RecordedCall>> {
        // A poisoned journal still holds valid history.
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, call: RecordedCall) {
        self.lock().push(call);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().clone()
    }

    /// Only the event records, in write order
    pub fn events(&self) -> Vec<EventRecord> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Event(record) => Some(*record),
                _ => None,
            })
            .collect()
    }

    #[cfg(test)]
    pub fn clear_events(&self) {
        self.lock()
            .retain(|call| !matches!(call, RecordedCall::Event(_)));
    }
}

/// Failure to inject into a recording backend
#[derive(Debug, Clone, Default)]
pub struct FailurePlan {
    /// Opening the node fails
    pub open: bool,
    /// The kernel rejects this key code
    pub reject_key: Option<KeyCode>,
    /// `UI_DEV_CREATE` fails
    pub create: bool,
    /// The write of this event (0-based) comes up short
    pub short_write_at: Option<usize>,
}

static NEXT_NODE: AtomicUsize = AtomicUsize::new(0);

/// uinput backend that records instead of injecting
pub struct RecordingBackend {
    node: PathBuf,
    journal: Journal,
    failures: FailurePlan,
    open: bool,
    writes: usize,
}

impl RecordingBackend {
    /// A backend on a fresh, process-unique node path
    pub fn new() -> Self {
        let id = NEXT_NODE.fetch_add(1, Ordering::Relaxed);
        Self::with_node(format!("recording://uinput/{}", id))
    }

    pub fn with_node(node: impl Into<PathBuf>) -> Self {
        Self {
            node: node.into(),
            journal: Journal::default(),
            failures: FailurePlan::default(),
            open: false,
            writes: 0,
        }
    }

    #[cfg(test)]
    pub fn with_failures(mut self, failures: FailurePlan) -> Self {
        self.failures = failures;
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    fn require_open(&self, operation: &str) -> DeviceResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(DeviceError::DeviceUnavailable(format!(
                "{} before {} was opened",
                operation,
                self.node.display()
            )))
        }
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl UinputBackend for RecordingBackend {
    fn node(&self) -> &Path {
        &self.node
    }

    fn open(&mut self) -> DeviceResult<()> {
        if self.failures.open {
            return Err(DeviceError::DeviceUnavailable(format!(
                "Cannot open {}: permission denied",
                self.node.display()
            )));
        }
        self.open = true;
        self.journal.push(RecordedCall::Open);
        Ok(())
    }

    fn enable_event_kind(&mut self, kind: EventKind) -> DeviceResult<()> {
        self.require_open("UI_SET_EVBIT")?;
        self.journal.push(RecordedCall::EnableEventKind(kind));
        Ok(())
    }

    fn enable_key(&mut self, code: KeyCode) -> DeviceResult<()> {
        self.require_open("UI_SET_KEYBIT")?;
        if self.failures.reject_key == Some(code) {
            return Err(DeviceError::DeviceUnavailable(format!(
                "UI_SET_KEYBIT {} rejected: EINVAL",
                code
            )));
        }
        self.journal.push(RecordedCall::EnableKey(code));
        Ok(())
    }

    fn setup(&mut self, identity: &DeviceIdentity) -> DeviceResult<()> {
        self.require_open("UI_DEV_SETUP")?;
        self.journal.push(RecordedCall::Setup(identity.clone()));
        Ok(())
    }

    fn create(&mut self) -> DeviceResult<()> {
        self.require_open("UI_DEV_CREATE")?;
        if self.failures.create {
            return Err(DeviceError::DeviceUnavailable(
                "UI_DEV_CREATE rejected: EINVAL".to_string(),
            ));
        }
        self.journal.push(RecordedCall::Create);
        Ok(())
    }

    fn destroy(&mut self) -> DeviceResult<()> {
        self.require_open("UI_DEV_DESTROY")?;
        self.journal.push(RecordedCall::Destroy);
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.journal.push(RecordedCall::Close);
        }
    }
}

impl Write for RecordingBackend {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "uinput node is not open",
            ));
        }

        let index = self.writes;
        self.writes += 1;
        if self.failures.short_write_at == Some(index) {
            return Ok(buf.len() / 2);
        }

        let record = EventRecord::decode(buf).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "not an input_event record")
        })?;
        self.journal.push(RecordedCall::Event(record));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::events::{keycodes::KEY_A, KeyState};

    #[test]
    fn test_nodes_are_unique() {
        let a = RecordingBackend::new();
        let b = RecordingBackend::new();
        assert_ne!(a.node(), b.node());
    }

    #[test]
    fn test_records_calls_in_order() {
        let mut backend = RecordingBackend::new();
        let journal = backend.journal();
        backend.open().unwrap();
        backend.enable_event_kind(EventKind::Key).unwrap();
        backend.enable_key(KEY_A).unwrap();
        backend
            .write(&EventRecord::key(KEY_A, KeyState::Pressed).encode())
            .unwrap();
        backend.close();

        assert_eq!(
            journal.calls(),
            vec![
                RecordedCall::Open,
                RecordedCall::EnableEventKind(EventKind::Key),
                RecordedCall::EnableKey(KEY_A),
                RecordedCall::Event(EventRecord::key(KEY_A, KeyState::Pressed)),
                RecordedCall::Close,
            ]
        );
    }

    #[test]
    fn test_injected_short_write() {
        let mut backend = RecordingBackend::new().with_failures(FailurePlan {
            short_write_at: Some(1),
            ..Default::default()
        });
        backend.open().unwrap();
        let bytes = EventRecord::sync().encode();
        assert_eq!(backend.write(&bytes).unwrap(), bytes.len());
        assert!(backend.write(&bytes).unwrap() < bytes.len());
        assert_eq!(backend.journal().events().len(), 1);
    }

    #[test]
    fn test_ioctl_requires_open() {
        let mut backend = RecordingBackend::new();
        assert!(backend.enable_key(KEY_A).is_err());
        assert!(backend.write(&EventRecord::sync().encode()).is_err());
    }
}
