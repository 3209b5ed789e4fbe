// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

use std::time::Duration;

use bitflags::bitflags;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::warn;

use crate::normalize::RawValue;

bitflags! {
    /// Armed modes in which a sensor is monitored.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModeMask: u8 {
        /// Monitored when armed perimeter (home/stay)
        const PERIMETER = 0b01;
        /// Monitored when fully armed (away)
        const FULL      = 0b10;
    }
}

impl ModeMask {
    /// Parse a list of mode names ("perimeter", "full"). Unknown names are
    /// logged and ignored.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let mut mask = Self::empty();
        for name in names {
            match name.as_ref().trim().to_ascii_lowercase().as_str() {
                "perimeter" => mask |= Self::PERIMETER,
                "full" => mask |= Self::FULL,
                other => warn!("Ignoring unknown mode mask entry: {other}"),
            }
        }
        mask
    }
}

/// How a firing sensor is escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum SensorPolicy {
    /// Straight to alarm.
    #[serde(rename = "instant")]
    Instant,
    /// Starts the entry delay.
    #[serde(rename = "entryDelay", alias = "entry_delay")]
    EntryDelay,
    /// Silent event, never an alarm.
    #[serde(rename = "silent")]
    Silent,
}

impl SensorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instant => "instant",
            Self::EntryDelay => "entryDelay",
            Self::Silent => "silent",
        }
    }
}

/// Canonical, immutable sensor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorDefinition {
    pub id: String,
    pub name: String,
    pub invert: bool,
    /// Per-sensor debounce; `None` uses the global default.
    pub debounce_ms: Option<u64>,
    pub policy: SensorPolicy,
    pub modes: ModeMask,
    pub bypassable: bool,
}

impl SensorDefinition {
    pub fn new(id: impl Into<String>, policy: SensorPolicy) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            invert: false,
            debounce_ms: None,
            policy,
            modes: ModeMask::all(),
            bypassable: true,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = Some(ms);
        self
    }

    pub fn modes(mut self, modes: ModeMask) -> Self {
        self.modes = modes;
        self
    }

    pub fn bypassable(mut self, bypassable: bool) -> Self {
        self.bypassable = bypassable;
        self
    }

    pub fn monitored_in(&self, mask: ModeMask) -> bool {
        self.modes.intersects(mask)
    }
}

/// A sensor entry as written in configuration.
///
/// Three generations of schema are accepted and adapted into one
/// [`SensorDefinition`]:
///
/// - policy based: `policy` + `modes` (+ `bypassable`)
/// - role based: `role` = `entry | perimeter | interior | silent`
/// - guideline based: `guideline` = `delayed | immediate | silent` + `interior`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub invert: bool,
    #[serde(default, alias = "debounce_ms")]
    pub debounce_ms: Option<i64>,
    #[serde(default)]
    pub policy: Option<SensorPolicy>,
    #[serde(default, alias = "modeMask", alias = "mode_mask")]
    pub modes: Option<Vec<String>>,
    #[serde(default)]
    pub bypassable: Option<bool>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub guideline: Option<String>,
    #[serde(default)]
    pub interior: bool,
}

impl SensorEntry {
    /// Adapt to the canonical definition. Returns `None` (after logging)
    /// when the entry has no usable identifier.
    pub fn into_definition(self) -> Option<SensorDefinition> {
        let id = match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                warn!("Skipping sensor without identifier (name={:?})", self.name);
                return None;
            }
        };

        let (policy, modes) = if let Some(policy) = self.policy {
            let modes = self
                .modes
                .as_deref()
                .map_or(ModeMask::all(), ModeMask::from_names);
            (policy, modes)
        } else if let Some(role) = self.role.as_deref() {
            Self::from_role(&id, role)
        } else if let Some(guideline) = self.guideline.as_deref() {
            Self::from_guideline(&id, guideline, self.interior)
        } else {
            warn!("Sensor {id}: no policy, role or guideline; treating as instant");
            (SensorPolicy::Instant, ModeMask::all())
        };

        if modes.is_empty() && policy != SensorPolicy::Silent {
            warn!("Sensor {id}: empty mode mask, sensor will never be monitored while armed");
        }

        let debounce_ms = self.debounce_ms.map(|ms| {
            if ms < 0 {
                warn!("Sensor {id}: negative debounce {ms}ms clamped to 0");
                0
            } else {
                ms as u64
            }
        });

        Some(SensorDefinition {
            name: self.name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| id.clone()),
            id,
            invert: self.invert,
            debounce_ms,
            policy,
            modes,
            bypassable: self.bypassable.unwrap_or(true),
        })
    }

    fn from_role(id: &str, role: &str) -> (SensorPolicy, ModeMask) {
        match role.trim().to_ascii_lowercase().as_str() {
            "entry" | "entry_exit" => (SensorPolicy::EntryDelay, ModeMask::all()),
            "perimeter" => (SensorPolicy::Instant, ModeMask::all()),
            "interior" => (SensorPolicy::Instant, ModeMask::FULL),
            "silent" => (SensorPolicy::Silent, ModeMask::all()),
            other => {
                warn!("Sensor {id}: unknown role {other}; treating as perimeter");
                (SensorPolicy::Instant, ModeMask::all())
            }
        }
    }

    fn from_guideline(id: &str, guideline: &str, interior: bool) -> (SensorPolicy, ModeMask) {
        let modes = if interior { ModeMask::FULL } else { ModeMask::all() };
        let policy = match guideline.trim().to_ascii_lowercase().as_str() {
            "delayed" => SensorPolicy::EntryDelay,
            "immediate" => SensorPolicy::Instant,
            "silent" => SensorPolicy::Silent,
            other => {
                warn!("Sensor {id}: unknown guideline {other}; treating as immediate");
                SensorPolicy::Instant
            }
        };
        (policy, modes)
    }
}

/// Mutable per-sensor state, rebuilt on every configuration load.
#[derive(Debug, Clone)]
pub struct Sensor {
    pub def: SensorDefinition,
    pub debounce: Duration,
    /// Last accepted normalized value. Absent while in trouble.
    pub last_value: Option<bool>,
    /// Most recent raw value accepted past debounce, readable or not.
    pub last_raw: Option<RawValue>,
    pub last_event: Option<Instant>,
    pub baseline: Option<bool>,
    pub snapshot: Option<bool>,
    pub bypassed: bool,
    pub auto_bypassed: bool,
}

impl Sensor {
    pub fn new(def: SensorDefinition, default_debounce_ms: u64) -> Self {
        let debounce = Duration::from_millis(def.debounce_ms.unwrap_or(default_debounce_ms));
        Self {
            def,
            debounce,
            last_value: None,
            last_raw: None,
            last_event: None,
            baseline: None,
            snapshot: None,
            bypassed: false,
            auto_bypassed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }

    /// True when an update at `now` falls inside the debounce window.
    pub fn is_debounced(&self, now: Instant) -> bool {
        self.last_event
            .is_some_and(|last| now.saturating_duration_since(last) < self.debounce)
    }

    /// Drop per-arming-cycle state (bypass and both snapshots).
    pub fn reset_cycle(&mut self) {
        self.baseline = None;
        self.snapshot = None;
        self.bypassed = false;
        self.auto_bypassed = false;
    }
}
