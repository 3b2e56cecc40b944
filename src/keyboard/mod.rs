//! Keyboard module - chorded key actuation on top of a virtual device

mod actuator;
mod modifiers;

pub use actuator::KeyActuator;
pub use modifiers::{EmissionOptions, ModifierSet, Stroke};
