// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::constants::EVENT_HISTORY;
use crate::devices::output::OutputWrite;
use crate::mode::ControlMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Alarm,
}

/// Type of a structured event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ArmingStarted,
    ArmingBlocked,
    SensorBypassed,
    Armed,
    Disarmed,
    EntryDelayStarted,
    AlarmPreStarted,
    AlarmFullStarted,
    AlarmOutputsTimeout,
    SilentEvent,
    TroubleAdded,
    TroubleRemoved,
    Silenced,
    Unsilenced,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArmingStarted => "arming_started",
            Self::ArmingBlocked => "arming_blocked",
            Self::SensorBypassed => "sensor_bypassed",
            Self::Armed => "armed",
            Self::Disarmed => "disarmed",
            Self::EntryDelayStarted => "entry_delay_started",
            Self::AlarmPreStarted => "alarm_pre_started",
            Self::AlarmFullStarted => "alarm_full_started",
            Self::AlarmOutputsTimeout => "alarm_outputs_timeout",
            Self::SilentEvent => "silent_event",
            Self::TroubleAdded => "trouble_added",
            Self::TroubleRemoved => "trouble_removed",
            Self::Silenced => "silenced",
            Self::Unsilenced => "unsilenced",
        }
    }

    /// Severity a record of this kind carries.
    pub fn severity(&self) -> Severity {
        match self {
            Self::ArmingBlocked | Self::TroubleAdded | Self::AlarmPreStarted => Severity::Warning,
            Self::AlarmFullStarted => Severity::Alarm,
            _ => Severity::Info,
        }
    }
}

/// Immutable structured event record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub mode: ControlMode,
    #[serde(skip_serializing_if = "Option::is_none", rename = "sensorId")]
    pub sensor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "sensorName")]
    pub sensor_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

/// Sensor reference attached to an event.
#[derive(Debug, Clone, Copy)]
pub struct SensorRef<'a> {
    pub id: &'a str,
    pub name: &'a str,
}

/// Append-only event sink with a monotonic sequence counter.
///
/// Keeps the last [`EVENT_HISTORY`] records for inspection; older records
/// are only visible to subscribers that were listening at the time.
#[derive(Debug, Default)]
pub struct EventLog {
    counter: u64,
    recent: VecDeque<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return it.
    pub fn append(
        &mut self,
        kind: EventKind,
        mode: ControlMode,
        sensor: Option<SensorRef<'_>>,
        message: impl Into<String>,
    ) -> EventRecord {
        self.counter += 1;
        let record = EventRecord {
            seq: self.counter,
            kind,
            mode,
            sensor_id: sensor.map(|s| s.id.to_string()),
            sensor_name: sensor.map(|s| s.name.to_string()),
            timestamp: Utc::now(),
            severity: kind.severity(),
            message: message.into(),
        };
        if self.recent.len() == EVENT_HISTORY {
            self.recent.pop_front();
        }
        self.recent.push_back(record.clone());
        record
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn last(&self) -> Option<&EventRecord> {
        self.recent.back()
    }

    pub fn recent(&self) -> impl Iterator<Item = &EventRecord> {
        self.recent.iter()
    }

    /// Kinds of the retained records, oldest first.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.recent.iter().map(|r| r.kind).collect()
    }
}

/// Everything the core publishes.
///
/// Users subscribe via `core.subscribe()` / `controller.subscribe()` to
/// receive a `tokio::sync::broadcast::Receiver<CoreEvent>`.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// Control mode committed
    ModeChanged {
        from: ControlMode,
        to: ControlMode,
    },
    /// Structured event record appended to the log
    Record(EventRecord),
    /// Output written by the core
    OutputWritten(OutputWrite),
    /// Exit countdown tick (remaining seconds)
    ExitCountdown(u64),
    /// Entry countdown tick (remaining seconds)
    EntryCountdown(u64),
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<CoreEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<CoreEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}
