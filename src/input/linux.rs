//! Linux uinput backend
//!
//! Talks to `/dev/uinput` directly: capability bits and device setup go
//! through ioctls, events are written as raw `input_event` records.
//!
//! Requirements:
//! - the `uinput` kernel module must be loaded
//! - the user must be root or have write access to the node

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use super::events::{EventKind, KeyCode};
use super::traits::{DeviceError, DeviceIdentity, DeviceResult, UinputBackend};

// uinput ioctl constants
const UINPUT_MAX_NAME_SIZE: usize = 80;

/// uinput_setup structure
#[repr(C)]
pub struct UinputSetup {
    id: InputId,
    name: [u8; UINPUT_MAX_NAME_SIZE],
    ff_effects_max: u32,
}

#[repr(C)]
struct InputId {
    bustype: u16,
    vendor: u16,
    product: u16,
    version: u16,
}

impl UinputSetup {
    fn new(identity: &DeviceIdentity) -> Self {
        let mut name = [0u8; UINPUT_MAX_NAME_SIZE];
        // Leave room for the terminating NUL.
        let len = identity.name.len().min(UINPUT_MAX_NAME_SIZE - 1);
        name[..len].copy_from_slice(&identity.name.as_bytes()[..len]);
        Self {
            id: InputId {
                bustype: identity.bus_type,
                vendor: identity.vendor,
                product: identity.product,
                version: identity.version,
            },
            name,
            ff_effects_max: 0,
        }
    }
}

mod ioctl {
    use super::UinputSetup;

    nix::ioctl_none!(ui_dev_create, b'U', 1);
    nix::ioctl_none!(ui_dev_destroy, b'U', 2);
    nix::ioctl_write_ptr!(ui_dev_setup, b'U', 3, UinputSetup);
    nix::ioctl_write_int!(ui_set_evbit, b'U', 100);
    nix::ioctl_write_int!(ui_set_keybit, b'U', 101);
}

fn rejected(what: String, err: nix::Error) -> DeviceError {
    DeviceError::DeviceUnavailable(format!("{} rejected: {}", what, err))
}

/// uinput backend over a real device node
pub struct LinuxUinput {
    node: PathBuf,
    file: Option<File>,
}

impl LinuxUinput {
    pub fn new(node: impl Into<PathBuf>) -> Self {
        Self {
            node: node.into(),
            file: None,
        }
    }

    /// Check if the uinput node exists
    pub fn is_available(node: &Path) -> bool {
        node.exists()
    }

    fn fd(&self, operation: &str) -> DeviceResult<libc::c_int> {
        self.file.as_ref().map(|f| f.as_raw_fd()).ok_or_else(|| {
            DeviceError::DeviceUnavailable(format!(
                "{} before {} was opened",
                operation,
                self.node.display()
            ))
        })
    }
}

impl UinputBackend for LinuxUinput {
    fn node(&self) -> &Path {
        &self.node
    }

    fn open(&mut self) -> DeviceResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.node)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => DeviceError::DeviceUnavailable(format!(
                    "{} not found. Load the module: sudo modprobe uinput",
                    self.node.display()
                )),
                io::ErrorKind::PermissionDenied => DeviceError::DeviceUnavailable(format!(
                    "Cannot open {}: {}. Run as root or add a udev rule granting write access",
                    self.node.display(),
                    e
                )),
                _ => DeviceError::DeviceUnavailable(format!(
                    "Cannot open {}: {}",
                    self.node.display(),
                    e
                )),
            })?;

        tracing::debug!("Opened {}", self.node.display());
        self.file = Some(file);
        Ok(())
    }

    fn enable_event_kind(&mut self, kind: EventKind) -> DeviceResult<()> {
        let fd = self.fd("UI_SET_EVBIT")?;
        unsafe { ioctl::ui_set_evbit(fd, kind.code().into()) }
            .map_err(|e| rejected(format!("UI_SET_EVBIT {:?}", kind), e))?;
        Ok(())
    }

    fn enable_key(&mut self, code: KeyCode) -> DeviceResult<()> {
        let fd = self.fd("UI_SET_KEYBIT")?;
        unsafe { ioctl::ui_set_keybit(fd, code.code().into()) }
            .map_err(|e| rejected(format!("UI_SET_KEYBIT {}", code), e))?;
        Ok(())
    }

    fn setup(&mut self, identity: &DeviceIdentity) -> DeviceResult<()> {
        let fd = self.fd("UI_DEV_SETUP")?;
        let setup = UinputSetup::new(identity);
        unsafe { ioctl::ui_dev_setup(fd, &setup) }
            .map_err(|e| rejected("UI_DEV_SETUP".to_string(), e))?;
        Ok(())
    }

    fn create(&mut self) -> DeviceResult<()> {
        let fd = self.fd("UI_DEV_CREATE")?;
        unsafe { ioctl::ui_dev_create(fd) }
            .map_err(|e| rejected("UI_DEV_CREATE".to_string(), e))?;
        Ok(())
    }

    fn destroy(&mut self) -> DeviceResult<()> {
        let fd = self.fd("UI_DEV_DESTROY")?;
        unsafe { ioctl::ui_dev_destroy(fd) }
            .map_err(|e| rejected("UI_DEV_DESTROY".to_string(), e))?;
        Ok(())
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            tracing::debug!("Closed {}", self.node.display());
        }
    }
}

impl Write for LinuxUinput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "uinput node is not open",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_name_is_nul_terminated() {
        let identity = DeviceIdentity {
            name: "x".repeat(200),
            ..Default::default()
        };
        let setup = UinputSetup::new(&identity);
        assert_eq!(setup.name[UINPUT_MAX_NAME_SIZE - 1], 0);
        assert_eq!(setup.name[0], b'x');
        assert_eq!(setup.id.vendor, 0x1234);
    }

    #[test]
    fn test_open_missing_node() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = LinuxUinput::new(dir.path().join("uinput"));
        match backend.open() {
            Err(DeviceError::DeviceUnavailable(msg)) => assert!(msg.contains("modprobe")),
            other => panic!("Expected DeviceUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_ioctl_before_open() {
        let mut backend = LinuxUinput::new("/nonexistent/uinput");
        assert!(matches!(
            backend.create(),
            Err(DeviceError::DeviceUnavailable(_))
        ));
        assert!(backend.write(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_write_goes_to_node() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut backend = LinuxUinput::new(file.path());
        backend.open().unwrap();
        assert_eq!(backend.write(&[1, 2, 3]).unwrap(), 3);
        backend.close();
        assert_eq!(std::fs::read(file.path()).unwrap(), vec![1, 2, 3]);
    }
}
