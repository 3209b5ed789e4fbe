// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

pub mod sensor;
pub mod output;

pub use sensor::{ModeMask, Sensor, SensorDefinition, SensorEntry, SensorPolicy};
pub use output::{OutputDefinition, OutputEntry, OutputKind, OutputValue, OutputWrite};
