// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::devices::output::OutputValue;
use crate::event::EventRecord;
use crate::mode::{ArmTarget, ControlMode};

/// The sensor and reason behind the most recent trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastTrigger {
    pub sensor_id: String,
    pub sensor_name: String,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Read-only snapshot of everything the core publishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmStatus {
    pub mode: ControlMode,
    pub arm_target: Option<ArmTarget>,
    pub alarm_active: bool,
    pub outputs_active: bool,
    pub silenced: bool,
    pub silent_active: bool,
    pub silent_events: u64,
    pub exit_remaining_sec: u64,
    pub entry_remaining_sec: u64,
    pub last_trigger: Option<LastTrigger>,
    pub trouble_active: bool,
    pub trouble_sensors: Vec<String>,
    pub open_sensors: Vec<String>,
    pub bypassed_sensors: Vec<String>,
    pub blocked_reason: Option<String>,
    pub event_counter: u64,
    pub last_event: Option<EventRecord>,
    pub outputs: BTreeMap<String, OutputValue>,
}

impl Default for AlarmStatus {
    fn default() -> Self {
        Self {
            mode: ControlMode::Disarmed,
            arm_target: None,
            alarm_active: false,
            outputs_active: false,
            silenced: false,
            silent_active: false,
            silent_events: 0,
            exit_remaining_sec: 0,
            entry_remaining_sec: 0,
            last_trigger: None,
            trouble_active: false,
            trouble_sensors: Vec::new(),
            open_sensors: Vec::new(),
            bypassed_sensors: Vec::new(),
            blocked_reason: None,
            event_counter: 0,
            last_event: None,
            outputs: BTreeMap::new(),
        }
    }
}
