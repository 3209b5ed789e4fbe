// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

use crate::constants::{DEFAULT_CHIRP_INTERVAL_MS, DEFAULT_DEBOUNCE_MS, MAX_CONFIG_VALUE};
use crate::devices::output::{OutputDefinition, OutputEntry};
use crate::devices::sensor::{SensorDefinition, SensorEntry};
use crate::error::Result;

/// Configuration of the alarm core. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmConfig {
    /// Exit delay in seconds (0 = arm immediately)
    pub exit_delay_sec: u64,
    /// Entry delay in seconds (0 = escalate immediately)
    pub entry_delay_sec: u64,
    /// Pre-alarm phase in seconds (0 = straight to full alarm)
    pub pre_alarm_sec: u64,
    /// How long outputs stay active in full alarm (0 = until disarm)
    pub alarm_duration_sec: u64,
    /// Chirp length during exit/entry delay (0 = no chirp)
    pub chirp_sec: u64,
    /// Chirp length after disarming an active alarm (0 = no chirp)
    pub post_alarm_chirp_sec: u64,
    /// Half-period of a chirp toggle in milliseconds
    pub chirp_interval_ms: u64,
    /// How long the silent-event indicator stays raised (0 = until disarm)
    pub silent_hold_sec: u64,
    /// Refuse to arm while a monitored sensor is open
    pub block_arming_if_open: bool,
    /// Bypass open bypassable sensors for the arming cycle
    pub auto_bypass_open_on_arming: bool,
    /// With auto-bypass, refuse to arm if an open sensor is not bypassable
    pub strict_bypass: bool,
    /// Tolerate sensors already open at arming time
    pub use_baseline_snapshot: bool,
    /// Global debounce in milliseconds
    pub default_debounce_ms: u64,
    pub sensors: Vec<SensorDefinition>,
    pub outputs: Vec<OutputDefinition>,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            exit_delay_sec: 30,
            entry_delay_sec: 30,
            pre_alarm_sec: 0,
            alarm_duration_sec: 180,
            chirp_sec: 0,
            post_alarm_chirp_sec: 0,
            chirp_interval_ms: DEFAULT_CHIRP_INTERVAL_MS,
            silent_hold_sec: 0,
            block_arming_if_open: true,
            auto_bypass_open_on_arming: false,
            strict_bypass: false,
            use_baseline_snapshot: false,
            default_debounce_ms: DEFAULT_DEBOUNCE_MS,
            sensors: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

impl AlarmConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> AlarmConfigBuilder {
        AlarmConfigBuilder::default()
    }

    /// Parse the `[alarm]`-style TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: AlarmToml = toml::from_str(text)?;
        Ok(raw.into_config())
    }
}

/// Builder for AlarmConfig.
#[derive(Debug, Clone, Default)]
pub struct AlarmConfigBuilder {
    config: AlarmConfig,
}

impl AlarmConfigBuilder {
    pub fn exit_delay_sec(mut self, sec: u64) -> Self {
        self.config.exit_delay_sec = sec;
        self
    }

    pub fn entry_delay_sec(mut self, sec: u64) -> Self {
        self.config.entry_delay_sec = sec;
        self
    }

    pub fn pre_alarm_sec(mut self, sec: u64) -> Self {
        self.config.pre_alarm_sec = sec;
        self
    }

    pub fn alarm_duration_sec(mut self, sec: u64) -> Self {
        self.config.alarm_duration_sec = sec;
        self
    }

    pub fn chirp_sec(mut self, sec: u64) -> Self {
        self.config.chirp_sec = sec;
        self
    }

    pub fn post_alarm_chirp_sec(mut self, sec: u64) -> Self {
        self.config.post_alarm_chirp_sec = sec;
        self
    }

    pub fn chirp_interval_ms(mut self, ms: u64) -> Self {
        self.config.chirp_interval_ms = ms;
        self
    }

    pub fn silent_hold_sec(mut self, sec: u64) -> Self {
        self.config.silent_hold_sec = sec;
        self
    }

    pub fn block_arming_if_open(mut self, block: bool) -> Self {
        self.config.block_arming_if_open = block;
        self
    }

    pub fn auto_bypass_open_on_arming(mut self, auto_bypass: bool) -> Self {
        self.config.auto_bypass_open_on_arming = auto_bypass;
        self
    }

    pub fn strict_bypass(mut self, strict: bool) -> Self {
        self.config.strict_bypass = strict;
        self
    }

    pub fn use_baseline_snapshot(mut self, baseline: bool) -> Self {
        self.config.use_baseline_snapshot = baseline;
        self
    }

    pub fn default_debounce_ms(mut self, ms: u64) -> Self {
        self.config.default_debounce_ms = ms;
        self
    }

    pub fn sensor(mut self, sensor: SensorDefinition) -> Self {
        self.config.sensors.push(sensor);
        self
    }

    pub fn output(mut self, output: OutputDefinition) -> Self {
        self.config.outputs.push(output);
        self
    }

    pub fn build(self) -> AlarmConfig {
        self.config
    }
}

/// Raw TOML shape. Delays are signed so that negative values can be
/// reported and clamped rather than rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmToml {
    #[serde(default, alias = "exit_delay_sec")]
    pub exit_delay_sec: Option<i64>,
    #[serde(default, alias = "entry_delay_sec")]
    pub entry_delay_sec: Option<i64>,
    #[serde(default, alias = "pre_alarm_sec")]
    pub pre_alarm_sec: Option<i64>,
    #[serde(default, alias = "alarm_duration_sec")]
    pub alarm_duration_sec: Option<i64>,
    #[serde(default, alias = "chirp_sec")]
    pub chirp_sec: Option<i64>,
    #[serde(default, alias = "post_alarm_chirp_sec")]
    pub post_alarm_chirp_sec: Option<i64>,
    #[serde(default, alias = "chirp_interval_ms")]
    pub chirp_interval_ms: Option<i64>,
    #[serde(default, alias = "silent_hold_sec")]
    pub silent_hold_sec: Option<i64>,
    #[serde(default, alias = "block_arming_if_open")]
    pub block_arming_if_open: Option<bool>,
    #[serde(default, alias = "auto_bypass_open_on_arming")]
    pub auto_bypass_open_on_arming: Option<bool>,
    #[serde(default, alias = "strict_bypass")]
    pub strict_bypass: Option<bool>,
    #[serde(default, alias = "use_baseline_snapshot")]
    pub use_baseline_snapshot: Option<bool>,
    #[serde(default, alias = "default_debounce_ms")]
    pub default_debounce_ms: Option<i64>,
    #[serde(default)]
    pub sensors: Vec<SensorEntry>,
    #[serde(default)]
    pub outputs: Vec<OutputEntry>,
}

fn clamp_non_negative(name: &str, value: Option<i64>, default: u64) -> u64 {
    match value {
        None => default,
        Some(v) if v < 0 => {
            warn!("Config {name}={v} is negative, clamped to 0");
            0
        }
        Some(v) if v as u64 > MAX_CONFIG_VALUE => {
            warn!("Config {name}={v} is too large, clamped to {MAX_CONFIG_VALUE}");
            MAX_CONFIG_VALUE
        }
        Some(v) => v as u64,
    }
}

impl AlarmToml {
    /// Adapt to the canonical config: clamp delays, decode every sensor
    /// shape and drop entries without identifiers. Duplicate identifiers are
    /// kept (the core resolves them, last one wins) but reported here.
    pub fn into_config(self) -> AlarmConfig {
        let d = AlarmConfig::default();

        let sensors: Vec<SensorDefinition> = self
            .sensors
            .into_iter()
            .filter_map(SensorEntry::into_definition)
            .collect();
        let outputs: Vec<OutputDefinition> = self
            .outputs
            .into_iter()
            .filter_map(OutputEntry::into_definition)
            .collect();

        warn_duplicates("sensor", sensors.iter().map(|s| s.id.as_str()));
        warn_duplicates("output", outputs.iter().map(|o| o.id.as_str()));

        let chirp_interval_ms = match clamp_non_negative(
            "chirpIntervalMs",
            self.chirp_interval_ms,
            d.chirp_interval_ms,
        ) {
            0 => {
                warn!("Config chirpIntervalMs=0 is not usable, using {DEFAULT_CHIRP_INTERVAL_MS}ms");
                DEFAULT_CHIRP_INTERVAL_MS
            }
            ms => ms,
        };

        AlarmConfig {
            exit_delay_sec: clamp_non_negative("exitDelaySec", self.exit_delay_sec, d.exit_delay_sec),
            entry_delay_sec: clamp_non_negative("entryDelaySec", self.entry_delay_sec, d.entry_delay_sec),
            pre_alarm_sec: clamp_non_negative("preAlarmSec", self.pre_alarm_sec, d.pre_alarm_sec),
            alarm_duration_sec: clamp_non_negative(
                "alarmDurationSec",
                self.alarm_duration_sec,
                d.alarm_duration_sec,
            ),
            chirp_sec: clamp_non_negative("chirpSec", self.chirp_sec, d.chirp_sec),
            post_alarm_chirp_sec: clamp_non_negative(
                "postAlarmChirpSec",
                self.post_alarm_chirp_sec,
                d.post_alarm_chirp_sec,
            ),
            chirp_interval_ms,
            silent_hold_sec: clamp_non_negative("silentHoldSec", self.silent_hold_sec, d.silent_hold_sec),
            block_arming_if_open: self.block_arming_if_open.unwrap_or(d.block_arming_if_open),
            auto_bypass_open_on_arming: self
                .auto_bypass_open_on_arming
                .unwrap_or(d.auto_bypass_open_on_arming),
            strict_bypass: self.strict_bypass.unwrap_or(d.strict_bypass),
            use_baseline_snapshot: self.use_baseline_snapshot.unwrap_or(d.use_baseline_snapshot),
            default_debounce_ms: clamp_non_negative(
                "defaultDebounceMs",
                self.default_debounce_ms,
                d.default_debounce_ms,
            ),
            sensors,
            outputs,
        }
    }
}

fn warn_duplicates<'a>(what: &str, ids: impl Iterator<Item = &'a str>) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for id in ids {
        *seen.entry(id).or_default() += 1;
    }
    for (id, count) in seen {
        if count > 1 {
            warn!("Duplicate {what} id {id} ({count} entries); last one wins");
        }
    }
}
