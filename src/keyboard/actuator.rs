//! Key actuator
//!
//! Turns press/release/click requests into ordered key and sync records.
//!
//! For a chord, the modifiers go down first (canonical order) and the
//! primary key last; on release the primary key comes up first and the
//! modifiers follow in the same canonical order. Every key record is
//! followed by a `SYN_REPORT`.
//!
//! Primary keys arrive as `DeclaredKey` handles minted by the device, so an
//! undeclared primary key cannot reach the actuator. Modifier keys implied
//! by a stroke are checked on every call.
//!
//! Held keys are not tracked across calls: `release` must be given the same
//! modifier set as the matching `press`.

use super::modifiers::{EmissionOptions, Stroke};
use crate::device::{pause, DeclaredKey, VirtualDevice};
use crate::input::{
    DeviceError, DeviceResult, DeviceState, EventKind, KeyCode, KeyState, UinputBackend,
    SYN_REPORT,
};

pub struct KeyActuator<'d, B: UinputBackend> {
    device: &'d mut VirtualDevice<B>,
}

impl<'d, B: UinputBackend> KeyActuator<'d, B> {
    pub fn new(device: &'d mut VirtualDevice<B>) -> Self {
        Self { device }
    }

    /// Handle for a key the device declared
    pub fn key(&self, code: KeyCode) -> DeviceResult<DeclaredKey> {
        self.device.key(code)
    }

    /// Press `key`, holding the stroke's modifiers first
    pub fn press(&mut self, key: DeclaredKey, stroke: Stroke) -> DeviceResult<()> {
        self.check("press", key, stroke)?;
        for modifier in stroke.modifiers.keys() {
            self.key_frame(modifier, KeyState::Pressed)?;
        }
        self.key_frame(key.code(), KeyState::Pressed)?;
        self.finish("pressed", key.code(), stroke.options);
        Ok(())
    }

    /// Release `key`, then the stroke's modifiers
    pub fn release(&mut self, key: DeclaredKey, stroke: Stroke) -> DeviceResult<()> {
        self.check("release", key, stroke)?;
        self.key_frame(key.code(), KeyState::Released)?;
        for modifier in stroke.modifiers.keys() {
            self.key_frame(modifier, KeyState::Released)?;
        }
        self.finish("released", key.code(), stroke.options);
        Ok(())
    }

    /// Press and release; the stroke's options apply once, after both halves
    pub fn click(&mut self, key: DeclaredKey, stroke: Stroke) -> DeviceResult<()> {
        let quiet = stroke.with_options(EmissionOptions::empty());
        self.press(key, quiet)?;
        self.release(key, quiet)?;
        self.finish("clicked", key.code(), stroke.options);
        Ok(())
    }

    /// Validate state, the key's origin and the chord's modifiers before
    /// writing anything
    fn check(&self, operation: &'static str, key: DeclaredKey, stroke: Stroke) -> DeviceResult<()> {
        if self.device.state() != DeviceState::Created {
            return Err(DeviceError::InvalidState {
                operation,
                state: self.device.state(),
            });
        }
        if !self.device.owns(key) {
            return Err(DeviceError::UnsupportedKey(key.code()));
        }
        match stroke.modifiers.keys().find(|m| !self.device.supports_key(*m)) {
            Some(modifier) => Err(DeviceError::UnsupportedKey(modifier)),
            None => Ok(()),
        }
    }

    fn key_frame(&mut self, code: KeyCode, state: KeyState) -> DeviceResult<()> {
        self.device.emit(EventKind::Key, code.code(), state as i32)?;
        self.device.emit(EventKind::Sync, SYN_REPORT, 0)
    }

    fn finish(&self, verb: &str, code: KeyCode, options: EmissionOptions) {
        if options.contains(EmissionOptions::LOG) {
            tracing::debug!("{} {}", verb, code.code());
        }
        if options.contains(EmissionOptions::SLEEP) {
            pause(self.device.timing().step);
        }
    }
}
