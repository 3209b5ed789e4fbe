// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::devices::sensor::ModeMask;
use crate::error::AlarmError;

/// The system-wide control mode. Exactly one is active at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Disarmed,
    Arming,
    ArmedFull,
    ArmedPerimeter,
    EntryDelay,
    AlarmPre,
    AlarmFull,
}

impl ControlMode {
    pub const ALL: [ControlMode; 7] = [
        Self::Disarmed,
        Self::Arming,
        Self::ArmedFull,
        Self::ArmedPerimeter,
        Self::EntryDelay,
        Self::AlarmPre,
        Self::AlarmFull,
    ];

    /// The wire string representation (e.g., "armed_full").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disarmed => "disarmed",
            Self::Arming => "arming",
            Self::ArmedFull => "armed_full",
            Self::ArmedPerimeter => "armed_perimeter",
            Self::EntryDelay => "entry_delay",
            Self::AlarmPre => "alarm_pre",
            Self::AlarmFull => "alarm_full",
        }
    }

    /// Fully armed and watching, not yet escalating.
    pub fn is_armed(&self) -> bool {
        matches!(self, Self::ArmedFull | Self::ArmedPerimeter)
    }

    /// Any mode reached after arming completed (armed or escalating).
    pub fn is_post_arm(&self) -> bool {
        matches!(
            self,
            Self::ArmedFull | Self::ArmedPerimeter | Self::EntryDelay | Self::AlarmPre | Self::AlarmFull
        )
    }

    pub fn is_alarm(&self) -> bool {
        matches!(self, Self::AlarmPre | Self::AlarmFull)
    }

    /// Modes during which chirp outputs toggle.
    pub fn is_transitional(&self) -> bool {
        matches!(self, Self::Arming | Self::EntryDelay)
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlMode {
    type Err = AlarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == trimmed)
            .ok_or_else(|| AlarmError::InvalidMode { value: s.to_string() })
    }
}

/// Target of an arm request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmTarget {
    /// Everything armed (away).
    Full,
    /// Only perimeter sensors armed (home/stay).
    Perimeter,
}

impl ArmTarget {
    /// The mode committed when arming toward this target completes.
    pub fn armed_mode(&self) -> ControlMode {
        match self {
            Self::Full => ControlMode::ArmedFull,
            Self::Perimeter => ControlMode::ArmedPerimeter,
        }
    }

    /// The mode-mask bit a sensor needs to be monitored under this target.
    pub fn mask(&self) -> ModeMask {
        match self {
            Self::Full => ModeMask::FULL,
            Self::Perimeter => ModeMask::PERIMETER,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Perimeter => "perimeter",
        }
    }
}

/// The single source of truth for the current control mode.
#[derive(Debug)]
pub struct ModeController {
    mode: ControlMode,
    transitions: u64,
}

impl ModeController {
    pub fn new() -> Self {
        Self {
            mode: ControlMode::Disarmed,
            transitions: 0,
        }
    }

    pub fn current(&self) -> ControlMode {
        self.mode
    }

    /// Number of committed transitions since startup.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Commit a new mode. Returns the previous mode, or `None` when the
    /// mode is already current (re-committing is a no-op).
    pub fn commit(&mut self, next: ControlMode) -> Option<ControlMode> {
        if self.mode == next {
            return None;
        }
        let previous = self.mode;
        self.mode = next;
        self.transitions += 1;
        info!("Mode {} -> {}", previous, next);
        Some(previous)
    }
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}
