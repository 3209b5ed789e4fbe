// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Output type. Informational to the core except that sirens honour the
/// silence flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Siren,
    Light,
    Notification,
    #[default]
    Custom,
}

impl OutputKind {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Siren => "Siren",
            Self::Light => "Light",
            Self::Notification => "Notification",
            Self::Custom => "Custom",
        }
    }
}

/// A value written to an output: boolean, number or string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<bool> for OutputValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for OutputValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Canonical, immutable output configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDefinition {
    pub id: String,
    pub name: String,
    pub kind: OutputKind,
    pub active_value: OutputValue,
    pub inactive_value: OutputValue,
    /// Pulses during exit/entry delay and after an alarm is disarmed.
    pub chirp: bool,
}

impl OutputDefinition {
    pub fn new(id: impl Into<String>, kind: OutputKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            active_value: OutputValue::Bool(true),
            inactive_value: OutputValue::Bool(false),
            chirp: false,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn values(mut self, active: impl Into<OutputValue>, inactive: impl Into<OutputValue>) -> Self {
        self.active_value = active.into();
        self.inactive_value = inactive.into();
        self
    }

    pub fn chirp(mut self, chirp: bool) -> Self {
        self.chirp = chirp;
        self
    }
}

/// An output entry as written in configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: OutputKind,
    #[serde(default, alias = "active_value")]
    pub active_value: Option<OutputValue>,
    #[serde(default, alias = "inactive_value")]
    pub inactive_value: Option<OutputValue>,
    #[serde(default)]
    pub chirp: bool,
}

impl OutputEntry {
    pub fn into_definition(self) -> Option<OutputDefinition> {
        let id = match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                warn!("Skipping output without identifier (name={:?})", self.name);
                return None;
            }
        };
        Some(OutputDefinition {
            name: self.name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| id.clone()),
            id,
            kind: self.kind,
            active_value: self.active_value.unwrap_or(OutputValue::Bool(true)),
            inactive_value: self.inactive_value.unwrap_or(OutputValue::Bool(false)),
            chirp: self.chirp,
        })
    }
}

/// One core-driven write to an output.
///
/// `ack` is always true: it marks the write as authoritative so the
/// external layer can tell it apart from user-driven writes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputWrite {
    pub id: String,
    pub value: OutputValue,
    pub ack: bool,
}

impl OutputWrite {
    pub fn new(id: impl Into<String>, value: OutputValue) -> Self {
        Self {
            id: id.into(),
            value,
            ack: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_entry_defaults() {
        let entry: OutputEntry = toml::from_str("id = \"siren\"\ntype = \"siren\"").unwrap();
        let def = entry.into_definition().unwrap();
        assert_eq!(def.kind, OutputKind::Siren);
        assert_eq!(def.active_value, OutputValue::Bool(true));
        assert_eq!(def.inactive_value, OutputValue::Bool(false));
        assert!(!def.chirp);
    }

    #[test]
    fn test_output_entry_mixed_values() {
        let entry: OutputEntry = toml::from_str(
            r#"
            id = "hue.scene"
            type = "light"
            activeValue = "alarm_red"
            inactiveValue = "off"
            "#,
        )
        .unwrap();
        let def = entry.into_definition().unwrap();
        assert_eq!(def.active_value, OutputValue::Text("alarm_red".into()));
        assert_eq!(def.inactive_value, OutputValue::Text("off".into()));

        let entry: OutputEntry =
            toml::from_str("id = \"dimmer\"\nactiveValue = 100\ninactiveValue = 0").unwrap();
        let def = entry.into_definition().unwrap();
        assert_eq!(def.active_value, OutputValue::Number(100.0));
    }

    #[test]
    fn test_output_entry_without_id() {
        let entry: OutputEntry = toml::from_str("name = \"nobody\"").unwrap();
        assert!(entry.into_definition().is_none());
    }

    #[test]
    fn test_output_write_is_acknowledged() {
        let write = OutputWrite::new("siren", true.into());
        assert!(write.ack);
        assert_eq!(
            serde_json::to_value(&write).unwrap(),
            serde_json::json!({"id": "siren", "value": true, "ack": true})
        );
    }
}
