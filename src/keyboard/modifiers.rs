//! Modifier sets and emission options

use bitflags::bitflags;

use crate::input::keycodes::*;
use crate::input::KeyCode;

bitflags! {
    /// Modifier keys held around a primary key
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModifierSet: u8 {
        const LEFT_SHIFT  = 0x01;
        const RIGHT_SHIFT = 0x02;
        const LEFT_ALT    = 0x04;
        const RIGHT_ALT   = 0x08;
        const LEFT_CTRL   = 0x10;
        const RIGHT_CTRL  = 0x20;
        const META        = 0x40;
    }
}

bitflags! {
    /// Per-call behaviour of a key actuation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EmissionOptions: u8 {
        /// Block for the settling interval afterwards
        const SLEEP = 0x01;
        /// Record a trace line
        const LOG   = 0x02;
    }
}

/// Emission order of modifiers: shift, alt, ctrl, meta; left before right
pub const CANONICAL_ORDER: [(ModifierSet, KeyCode); 7] = [
    (ModifierSet::LEFT_SHIFT, KEY_LEFTSHIFT),
    (ModifierSet::RIGHT_SHIFT, KEY_RIGHTSHIFT),
    (ModifierSet::LEFT_ALT, KEY_LEFTALT),
    (ModifierSet::RIGHT_ALT, KEY_RIGHTALT),
    (ModifierSet::LEFT_CTRL, KEY_LEFTCTRL),
    (ModifierSet::RIGHT_CTRL, KEY_RIGHTCTRL),
    // KEY_OPTION stays declarable but is not what Meta presses.
    (ModifierSet::META, KEY_LEFTMETA),
];

impl ModifierSet {
    /// Physical keys for the set, in canonical order
    pub fn keys(self) -> impl Iterator<Item = KeyCode> {
        CANONICAL_ORDER
            .into_iter()
            .filter(move |(modifier, _)| self.contains(*modifier))
            .map(|(_, key)| key)
    }

    /// Parse a single modifier name such as `shift`, `left-alt` or `RightCtrl`
    pub fn parse_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let modifier = match normalized.as_str() {
            "shift" | "leftshift" | "lshift" => ModifierSet::LEFT_SHIFT,
            "rightshift" | "rshift" => ModifierSet::RIGHT_SHIFT,
            "alt" | "leftalt" | "lalt" => ModifierSet::LEFT_ALT,
            "rightalt" | "ralt" | "altgr" => ModifierSet::RIGHT_ALT,
            "ctrl" | "control" | "leftctrl" | "lctrl" => ModifierSet::LEFT_CTRL,
            "rightctrl" | "rctrl" => ModifierSet::RIGHT_CTRL,
            "meta" | "super" => ModifierSet::META,
            _ => return None,
        };
        Some(modifier)
    }
}

/// Modifiers and options for one actuator call
///
/// Defaults to no modifiers with logging on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stroke {
    pub modifiers: ModifierSet,
    pub options: EmissionOptions,
}

impl Default for Stroke {
    fn default() -> Self {
        Self {
            modifiers: ModifierSet::empty(),
            options: EmissionOptions::LOG,
        }
    }
}

impl Stroke {
    pub fn new() -> Self {
        Self::default()
    }

    /// No modifiers, no logging, no sleeping
    pub const fn silent() -> Self {
        Self {
            modifiers: ModifierSet::empty(),
            options: EmissionOptions::empty(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: ModifierSet) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_options(mut self, options: EmissionOptions) -> Self {
        self.options = options;
        self
    }
}
