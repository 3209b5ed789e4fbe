// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

use std::time::Duration;

/// Default debounce window for sensors without an override, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 0;

/// Resolution of the exit/entry countdown counters.
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Default period of one chirp on/off half-cycle, in milliseconds.
pub const DEFAULT_CHIRP_INTERVAL_MS: u64 = 500;

/// Upper bound for any delay or interval read from configuration.
pub const MAX_CONFIG_VALUE: u64 = u32::MAX as u64;

/// Number of event records kept in the in-memory ring.
pub const EVENT_HISTORY: usize = 100;

/// Capacity of the core event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the controller command queue.
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Reason strings recorded as the last trigger / escalation cause.
pub mod reason {
    pub const ENTRY_DELAY_ELAPSED: &str = "entry_delay_elapsed";
    pub const ALARM_PRE_ELAPSED: &str = "alarm_pre_elapsed";
    pub const SENSOR_INSTANT: &str = "sensor_instant";
    pub const SENSOR_STATE_CHANGE: &str = "sensor_state_change";
    pub const SENSOR_ENTRY_DELAY: &str = "sensor_entry_delay";
    pub const SENSOR_SILENT: &str = "sensor_silent";
    pub const MANUAL: &str = "manual";
    pub const OPEN_SENSORS: &str = "open_sensors";
}
