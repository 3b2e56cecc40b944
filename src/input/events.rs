//! Input event types
//!
//! The fixed-size record written to the uinput node, plus the Linux key code
//! table the virtual keyboard draws its capabilities from.

use std::fmt;
use std::mem::size_of;

use self::keycodes::*;

/// Event kinds the virtual keyboard emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum EventKind {
    /// Frame boundary (`EV_SYN`)
    Sync = 0x00,
    /// Key state change (`EV_KEY`)
    Key = 0x01,
}

impl EventKind {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x00 => Some(EventKind::Sync),
            0x01 => Some(EventKind::Key),
            _ => None,
        }
    }
}

/// `SYN_REPORT` code carried by every sync event
pub const SYN_REPORT: u16 = 0x00;

/// Value of a key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum KeyState {
    Released = 0,
    Pressed = 1,
}

/// A Linux input key code (`KEY_*` from `input-event-codes.h`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub fn code(self) -> u16 {
        self.0
    }

    /// Symbolic name without the `KEY_` prefix, if the code is in the table
    pub fn name(self) -> Option<&'static str> {
        KEY_NAMES
            .iter()
            .find(|(_, code)| *code == self)
            .map(|(name, _)| *name)
    }

    /// Look up a key by name, accepting `KEY_A`, `key_a` or `a`
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("KEY_").unwrap_or(&upper);
        KEY_NAMES
            .iter()
            .find(|(n, _)| *n == bare)
            .map(|(_, code)| *code)
    }

    /// Key for an unshifted ASCII character on the declared key set
    pub fn from_char(c: char) -> Option<Self> {
        let key = match c {
            'a'..='z' => return Self::from_name(&c.to_string()),
            '1'..='9' => KeyCode(c as u16 - '1' as u16 + KEY_1.0),
            '0' => KEY_0,
            ' ' => KEY_SPACE,
            ';' => KEY_SEMICOLON,
            ',' => KEY_COMMA,
            '.' => KEY_DOT,
            '/' => KEY_SLASH,
            '\'' => KEY_APOSTROPHE,
            '`' => KEY_GRAVE,
            '=' => KEY_EQUAL,
            _ => return None,
        };
        Some(key)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "KEY_{}", name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// One logical input event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub kind: EventKind,
    pub code: u16,
    pub value: i32,
}

impl EventRecord {
    pub fn key(code: KeyCode, state: KeyState) -> Self {
        Self {
            kind: EventKind::Key,
            code: code.0,
            value: state as i32,
        }
    }

    pub fn sync() -> Self {
        Self {
            kind: EventKind::Sync,
            code: SYN_REPORT,
            value: 0,
        }
    }

    pub fn is_sync(&self) -> bool {
        self.kind == EventKind::Sync
    }

    pub fn encode(&self) -> Vec<u8> {
        InputEventRaw::from(*self).to_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let raw = InputEventRaw::from_bytes(bytes)?;
        Some(Self {
            kind: EventKind::from_code(raw.type_)?,
            code: raw.code,
            value: raw.value,
        })
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::Sync => write!(f, "SYN_REPORT"),
            EventKind::Key => {
                let state = if self.value == 0 { "up" } else { "down" };
                write!(f, "{} {}", KeyCode(self.code), state)
            }
        }
    }
}

/// Raw input_event structure (matches Linux kernel structure)
///
/// The timestamp is always zero; the kernel stamps injected events itself.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct InputEventRaw {
    tv_sec: libc::c_long,
    tv_usec: libc::c_long,
    type_: u16,
    code: u16,
    value: i32,
}

/// Size in bytes of one event record on the wire
pub const EVENT_RECORD_SIZE: usize = size_of::<InputEventRaw>();

impl From<EventRecord> for InputEventRaw {
    fn from(record: EventRecord) -> Self {
        Self {
            tv_sec: 0,
            tv_usec: 0,
            type_: record.kind.code(),
            code: record.code,
            value: record.value,
        }
    }
}

impl InputEventRaw {
    fn to_bytes(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(EVENT_RECORD_SIZE);
        bytes.extend_from_slice(&self.tv_sec.to_ne_bytes());
        bytes.extend_from_slice(&self.tv_usec.to_ne_bytes());
        bytes.extend_from_slice(&self.type_.to_ne_bytes());
        bytes.extend_from_slice(&self.code.to_ne_bytes());
        bytes.extend_from_slice(&self.value.to_ne_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < EVENT_RECORD_SIZE {
            return None;
        }
        let long = size_of::<libc::c_long>();
        let base = 2 * long;
        Some(Self {
            tv_sec: libc::c_long::from_ne_bytes(bytes[0..long].try_into().ok()?),
            tv_usec: libc::c_long::from_ne_bytes(bytes[long..base].try_into().ok()?),
            type_: u16::from_ne_bytes(bytes[base..base + 2].try_into().ok()?),
            code: u16::from_ne_bytes(bytes[base + 2..base + 4].try_into().ok()?),
            value: i32::from_ne_bytes(bytes[base + 4..base + 8].try_into().ok()?),
        })
    }
}

/// Linux keycodes used by the virtual keyboard
pub mod keycodes {
    use super::KeyCode;

    pub const KEY_1: KeyCode = KeyCode(2);
    pub const KEY_2: KeyCode = KeyCode(3);
    pub const KEY_3: KeyCode = KeyCode(4);
    pub const KEY_4: KeyCode = KeyCode(5);
    pub const KEY_5: KeyCode = KeyCode(6);
    pub const KEY_6: KeyCode = KeyCode(7);
    pub const KEY_7: KeyCode = KeyCode(8);
    pub const KEY_8: KeyCode = KeyCode(9);
    pub const KEY_9: KeyCode = KeyCode(10);
    pub const KEY_0: KeyCode = KeyCode(11);
    pub const KEY_EQUAL: KeyCode = KeyCode(13);

    pub const KEY_Q: KeyCode = KeyCode(16);
    pub const KEY_W: KeyCode = KeyCode(17);
    pub const KEY_E: KeyCode = KeyCode(18);
    pub const KEY_R: KeyCode = KeyCode(19);
    pub const KEY_T: KeyCode = KeyCode(20);
    pub const KEY_Y: KeyCode = KeyCode(21);
    pub const KEY_U: KeyCode = KeyCode(22);
    pub const KEY_I: KeyCode = KeyCode(23);
    pub const KEY_O: KeyCode = KeyCode(24);
    pub const KEY_P: KeyCode = KeyCode(25);
    pub const KEY_LEFTCTRL: KeyCode = KeyCode(29);
    pub const KEY_A: KeyCode = KeyCode(30);
    pub const KEY_S: KeyCode = KeyCode(31);
    pub const KEY_D: KeyCode = KeyCode(32);
    pub const KEY_F: KeyCode = KeyCode(33);
    pub const KEY_G: KeyCode = KeyCode(34);
    pub const KEY_H: KeyCode = KeyCode(35);
    pub const KEY_J: KeyCode = KeyCode(36);
    pub const KEY_K: KeyCode = KeyCode(37);
    pub const KEY_L: KeyCode = KeyCode(38);
    pub const KEY_SEMICOLON: KeyCode = KeyCode(39);
    pub const KEY_APOSTROPHE: KeyCode = KeyCode(40);
    pub const KEY_GRAVE: KeyCode = KeyCode(41);
    pub const KEY_LEFTSHIFT: KeyCode = KeyCode(42);
    pub const KEY_Z: KeyCode = KeyCode(44);
    pub const KEY_X: KeyCode = KeyCode(45);
    pub const KEY_C: KeyCode = KeyCode(46);
    pub const KEY_V: KeyCode = KeyCode(47);
    pub const KEY_B: KeyCode = KeyCode(48);
    pub const KEY_N: KeyCode = KeyCode(49);
    pub const KEY_M: KeyCode = KeyCode(50);
    pub const KEY_COMMA: KeyCode = KeyCode(51);
    pub const KEY_DOT: KeyCode = KeyCode(52);
    pub const KEY_SLASH: KeyCode = KeyCode(53);
    pub const KEY_RIGHTSHIFT: KeyCode = KeyCode(54);
    pub const KEY_LEFTALT: KeyCode = KeyCode(56);
    pub const KEY_SPACE: KeyCode = KeyCode(57);
    pub const KEY_RIGHTCTRL: KeyCode = KeyCode(97);
    pub const KEY_RIGHTALT: KeyCode = KeyCode(100);
    pub const KEY_LEFTMETA: KeyCode = KeyCode(125);
    pub const KEY_OPTION: KeyCode = KeyCode(357);
}

/// Name table, without the `KEY_` prefix
static KEY_NAMES: &[(&str, KeyCode)] = &[
    ("1", KEY_1),
    ("2", KEY_2),
    ("3", KEY_3),
    ("4", KEY_4),
    ("5", KEY_5),
    ("6", KEY_6),
    ("7", KEY_7),
    ("8", KEY_8),
    ("9", KEY_9),
    ("0", KEY_0),
    ("EQUAL", KEY_EQUAL),
    ("Q", KEY_Q),
    ("W", KEY_W),
    ("E", KEY_E),
    ("R", KEY_R),
    ("T", KEY_T),
    ("Y", KEY_Y),
    ("U", KEY_U),
    ("I", KEY_I),
    ("O", KEY_O),
    ("P", KEY_P),
    ("LEFTCTRL", KEY_LEFTCTRL),
    ("A", KEY_A),
    ("S", KEY_S),
    ("D", KEY_D),
    ("F", KEY_F),
    ("G", KEY_G),
    ("H", KEY_H),
    ("J", KEY_J),
    ("K", KEY_K),
    ("L", KEY_L),
    ("SEMICOLON", KEY_SEMICOLON),
    ("APOSTROPHE", KEY_APOSTROPHE),
    ("GRAVE", KEY_GRAVE),
    ("LEFTSHIFT", KEY_LEFTSHIFT),
    ("Z", KEY_Z),
    ("X", KEY_X),
    ("C", KEY_C),
    ("V", KEY_V),
    ("B", KEY_B),
    ("N", KEY_N),
    ("M", KEY_M),
    ("COMMA", KEY_COMMA),
    ("DOT", KEY_DOT),
    ("SLASH", KEY_SLASH),
    ("RIGHTSHIFT", KEY_RIGHTSHIFT),
    ("LEFTALT", KEY_LEFTALT),
    ("SPACE", KEY_SPACE),
    ("RIGHTCTRL", KEY_RIGHTCTRL),
    ("RIGHTALT", KEY_RIGHTALT),
    ("LEFTMETA", KEY_LEFTMETA),
    ("OPTION", KEY_OPTION),
];

/// Every key the table knows, in the order the keyboard declares them
pub fn default_keyboard_keys() -> Vec<KeyCode> {
    let mut keys = vec![
        KEY_SPACE,
        KEY_OPTION,
        KEY_LEFTMETA,
        KEY_LEFTCTRL,
        KEY_RIGHTCTRL,
        KEY_LEFTALT,
        KEY_RIGHTALT,
        KEY_LEFTSHIFT,
        KEY_RIGHTSHIFT,
        KEY_SEMICOLON,
        KEY_COMMA,
        KEY_DOT,
        KEY_SLASH,
        KEY_APOSTROPHE,
        KEY_GRAVE,
        KEY_EQUAL,
    ];
    keys.extend(('a'..='z').filter_map(KeyCode::from_char));
    keys.extend(('1'..='9').filter_map(KeyCode::from_char));
    keys.push(KEY_0);
    keys
}
