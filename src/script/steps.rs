//! Script definitions
//!
//! A script is an ordered list of key steps. Scripts come from the built-in
//! fixtures or from a TOML file:
//!
//! ```toml
//! name = "greeting"
//!
//! [[steps]]
//! click = "h"
//! modifiers = ["left-shift"]
//!
//! [[steps]]
//! text = "ello"
//!
//! [[steps]]
//! pause_ms = 200
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::input::keycodes::*;
use crate::input::KeyCode;
use crate::keyboard::ModifierSet;

/// Errors building or loading a script
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Unknown modifier: {0}")]
    UnknownModifier(String),

    #[error("No key types {0:?}")]
    UnmappedChar(char),

    #[error("Step {index}: {reason}")]
    InvalidStep { index: usize, reason: String },

    #[error("Unknown script '{0}' (built-in scripts: {})", BUILTIN_SCRIPTS.join(", "))]
    UnknownScript(String),
}

pub type ScriptResult<T> = Result<T, ScriptError>;

/// Names accepted by [`Script::builtin`]
pub const BUILTIN_SCRIPTS: &[&str] = &["sentence", "dead-key", "digits"];

/// One step of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Click { key: KeyCode, modifiers: ModifierSet },
    Press { key: KeyCode, modifiers: ModifierSet },
    Release { key: KeyCode, modifiers: ModifierSet },
    Pause(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    name: String,
    steps: Vec<Step>,
}

impl Script {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn push(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn click(self, key: KeyCode) -> Self {
        self.chord(key, ModifierSet::empty())
    }

    pub fn chord(self, key: KeyCode, modifiers: ModifierSet) -> Self {
        self.push(Step::Click { key, modifiers })
    }

    pub fn press(self, key: KeyCode, modifiers: ModifierSet) -> Self {
        self.push(Step::Press { key, modifiers })
    }

    pub fn release(self, key: KeyCode, modifiers: ModifierSet) -> Self {
        self.push(Step::Release { key, modifiers })
    }

    pub fn pause(self, duration: Duration) -> Self {
        self.push(Step::Pause(duration))
    }

    /// Click each character of `text`; only unshifted keys are available
    pub fn text(mut self, text: &str) -> ScriptResult<Self> {
        for c in text.chars() {
            let key = KeyCode::from_char(c).ok_or(ScriptError::UnmappedChar(c))?;
            self = self.click(key);
        }
        Ok(self)
    }

    /// "from the ghost", one click per character
    pub fn sentence() -> Self {
        [
            KEY_F, KEY_R, KEY_O, KEY_M, KEY_SPACE, KEY_T, KEY_H, KEY_E, KEY_SPACE, KEY_G, KEY_H,
            KEY_O, KEY_S, KEY_T,
        ]
        .into_iter()
        .fold(Self::new("sentence"), Self::click)
    }

    /// Hold grave with left alt and left shift, tap U, let go
    pub fn dead_key() -> Self {
        let mods = ModifierSet::LEFT_ALT | ModifierSet::LEFT_SHIFT;
        Self::new("dead-key")
            .press(KEY_GRAVE, mods)
            .click(KEY_U)
            .release(KEY_GRAVE, mods)
    }

    /// Each digit plain, with either shift and with either alt
    pub fn digits() -> Self {
        let variants = [
            ModifierSet::empty(),
            ModifierSet::LEFT_SHIFT,
            ModifierSet::RIGHT_SHIFT,
            ModifierSet::LEFT_ALT,
            ModifierSet::RIGHT_ALT,
        ];
        let digits = [
            KEY_1, KEY_2, KEY_3, KEY_4, KEY_5, KEY_6, KEY_7, KEY_8, KEY_9, KEY_0,
        ];

        let mut script = Self::new("digits");
        for digit in digits {
            for mods in variants {
                script = script.chord(digit, mods);
            }
            script = script.pause(Duration::from_millis(200));
        }
        script
    }

    pub fn builtin(name: &str) -> ScriptResult<Self> {
        match name {
            "sentence" => Ok(Self::sentence()),
            "dead-key" => Ok(Self::dead_key()),
            "digits" => Ok(Self::digits()),
            other => Err(ScriptError::UnknownScript(other.to_string())),
        }
    }

    /// A built-in name, or else a path to a script file
    pub fn resolve(name_or_path: &str) -> ScriptResult<Self> {
        if BUILTIN_SCRIPTS.contains(&name_or_path) {
            return Self::builtin(name_or_path);
        }
        let path = Path::new(name_or_path);
        if path.exists() {
            Self::load(path)
        } else {
            Err(ScriptError::UnknownScript(name_or_path.to_string()))
        }
    }

    pub fn load(path: &Path) -> ScriptResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let fallback = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "script".to_string());
        Self::from_toml(&contents, &fallback)
    }

    pub fn from_toml(contents: &str, fallback_name: &str) -> ScriptResult<Self> {
        let file: ScriptFile = toml::from_str(contents)?;
        let mut script = Self::new(file.name.unwrap_or_else(|| fallback_name.to_string()));
        for (i, entry) in file.steps.into_iter().enumerate() {
            script = entry.append_to(script, i + 1)?;
        }
        Ok(script)
    }
}

#[derive(Debug, Deserialize)]
struct ScriptFile {
    name: Option<String>,
    #[serde(default)]
    steps: Vec<StepEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepEntry {
    click: Option<String>,
    press: Option<String>,
    release: Option<String>,
    text: Option<String>,
    pause_ms: Option<u64>,
    #[serde(default)]
    modifiers: Vec<String>,
}

fn parse_key(name: &str) -> ScriptResult<KeyCode> {
    KeyCode::from_name(name).ok_or_else(|| ScriptError::UnknownKey(name.to_string()))
}

/// Union of modifier names
pub fn parse_modifiers<S: AsRef<str>>(names: &[S]) -> ScriptResult<ModifierSet> {
    names.iter().try_fold(ModifierSet::empty(), |acc, name| {
        let name = name.as_ref();
        ModifierSet::parse_name(name)
            .map(|m| acc | m)
            .ok_or_else(|| ScriptError::UnknownModifier(name.to_string()))
    })
}

impl StepEntry {
    fn append_to(self, script: Script, index: usize) -> ScriptResult<Script> {
        let actions = [
            self.click.is_some(),
            self.press.is_some(),
            self.release.is_some(),
            self.text.is_some(),
            self.pause_ms.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if actions != 1 {
            return Err(ScriptError::InvalidStep {
                index,
                reason: format!(
                    "expected exactly one of click, press, release, text, pause_ms; found {}",
                    actions
                ),
            });
        }

        let modifiers = parse_modifiers(self.modifiers.as_slice())?;
        if !modifiers.is_empty() && (self.text.is_some() || self.pause_ms.is_some()) {
            return Err(ScriptError::InvalidStep {
                index,
                reason: "modifiers only apply to click, press and release".to_string(),
            });
        }

        if let Some(name) = self.click {
            Ok(script.chord(parse_key(&name)?, modifiers))
        } else if let Some(name) = self.press {
            Ok(script.press(parse_key(&name)?, modifiers))
        } else if let Some(name) = self.release {
            Ok(script.release(parse_key(&name)?, modifiers))
        } else if let Some(text) = self.text {
            script.text(&text)
        } else {
            let ms = self.pause_ms.unwrap_or_default();
            Ok(script.pause(Duration::from_millis(ms)))
        }
    }
}
