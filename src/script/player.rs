//! Script playback
//!
//! Drives a key actuator through a script, one step at a time, with a
//! uniform delay after every step. The whole script is checked against the
//! device capabilities first so an undeclared key never leaves a chord
//! half-pressed.

use std::time::Duration;

use super::steps::{Script, Step};
use crate::device::{pause, DeclaredKey};
use crate::input::{DeviceResult, UinputBackend};
use crate::keyboard::{EmissionOptions, KeyActuator, ModifierSet, Stroke};

/// A step whose keys were checked against the device
#[derive(Debug, Clone, Copy)]
enum Action {
    Click(DeclaredKey, ModifierSet),
    Press(DeclaredKey, ModifierSet),
    Release(DeclaredKey, ModifierSet),
    Pause(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptPlayer {
    step_delay: Duration,
    options: EmissionOptions,
}

impl Default for ScriptPlayer {
    fn default() -> Self {
        Self {
            step_delay: Duration::ZERO,
            options: EmissionOptions::LOG,
        }
    }
}

impl ScriptPlayer {
    pub fn new(step_delay: Duration) -> Self {
        Self {
            step_delay,
            ..Default::default()
        }
    }

    /// Emission options passed to every actuator call
    pub fn with_options(mut self, options: EmissionOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolve every key the script touches, modifiers included
    fn prepare<B: UinputBackend>(
        actuator: &KeyActuator<'_, B>,
        script: &Script,
    ) -> DeviceResult<Vec<Action>> {
        let resolve = |key, modifiers: ModifierSet| -> DeviceResult<DeclaredKey> {
            let declared = actuator.key(key)?;
            for modifier in modifiers.keys() {
                actuator.key(modifier)?;
            }
            Ok(declared)
        };

        script
            .steps()
            .iter()
            .map(|step| {
                let action = match *step {
                    Step::Click { key, modifiers } => {
                        Action::Click(resolve(key, modifiers)?, modifiers)
                    }
                    Step::Press { key, modifiers } => {
                        Action::Press(resolve(key, modifiers)?, modifiers)
                    }
                    Step::Release { key, modifiers } => {
                        Action::Release(resolve(key, modifiers)?, modifiers)
                    }
                    Step::Pause(duration) => Action::Pause(duration),
                };
                Ok(action)
            })
            .collect::<DeviceResult<Vec<_>>>()
            .map_err(|e| {
                tracing::error!("Script '{}' cannot run: {}", script.name(), e);
                e
            })
    }

    /// Play the script; returns the number of steps played
    ///
    /// Every key is checked before the first write.
    pub fn play<B: UinputBackend>(
        &self,
        actuator: &mut KeyActuator<'_, B>,
        script: &Script,
    ) -> DeviceResult<usize> {
        let actions = Self::prepare(actuator, script)?;
        if script.is_empty() {
            tracing::warn!("Script '{}' has no steps", script.name());
        }
        tracing::info!("Playing '{}' ({} steps)", script.name(), actions.len());

        for (i, action) in actions.iter().enumerate() {
            let result = match *action {
                Action::Click(key, modifiers) => actuator.click(key, self.stroke(modifiers)),
                Action::Press(key, modifiers) => actuator.press(key, self.stroke(modifiers)),
                Action::Release(key, modifiers) => actuator.release(key, self.stroke(modifiers)),
                Action::Pause(duration) => {
                    pause(duration);
                    Ok(())
                }
            };
            if let Err(e) = result {
                tracing::error!("Step {} of '{}' failed: {}", i + 1, script.name(), e);
                return Err(e);
            }
            pause(self.step_delay);
        }

        tracing::info!("Finished '{}'", script.name());
        Ok(actions.len())
    }

    fn stroke(&self, modifiers: ModifierSet) -> Stroke {
        Stroke::new()
            .with_modifiers(modifiers)
            .with_options(self.options)
    }
}
