// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::AlarmConfig;
use crate::constants::{reason, COUNTDOWN_TICK, EVENT_CHANNEL_CAPACITY};
use crate::devices::sensor::Sensor;
use crate::driver::{OutputContext, OutputDriver};
use crate::error::{AlarmError, Result};
use crate::event::{event_channel, CoreEvent, EventKind, EventLog, EventReceiver, EventSender, SensorRef, Severity};
use crate::mode::{ArmTarget, ControlMode, ModeController};
use crate::status::{AlarmStatus, LastTrigger};
use crate::timer::{TimerKind, TimerTable};
use crate::trouble::TroubleTracker;

/// Display flags driven by escalation.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AlarmFlags {
    pub alarm_active: bool,
    pub outputs_active: bool,
    pub silenced: bool,
    pub silent_active: bool,
    pub silent_events: u64,
}

/// The alarm control core.
///
/// One value owns every piece of mutable state: the mode register, the
/// per-sensor runtime table, the trouble set, the timer table, the output
/// driver and the event log. All entry points take `&mut self` plus the
/// current instant, so a caller that serializes calls (the
/// [`AlarmController`](crate::controller::AlarmController) task, or a test)
/// gets atomic transitions for free.
///
/// Timers never fire on their own: call [`advance`](Self::advance) with the
/// current time and every expired timer runs in deadline order.
///
/// # Example
///
/// ```
/// use alarm_core::{AlarmConfig, AlarmCore, ArmTarget, ControlMode, SensorDefinition, SensorPolicy};
/// use std::time::Duration;
/// use tokio::time::Instant;
///
/// let config = AlarmConfig::builder()
///     .exit_delay_sec(0)
///     .entry_delay_sec(10)
///     .sensor(SensorDefinition::new("front_door", SensorPolicy::EntryDelay))
///     .build();
/// let mut core = AlarmCore::new(config);
/// let t0 = Instant::now();
///
/// core.update_sensor("front_door", false, t0);
/// core.arm(ArmTarget::Full, t0).unwrap();
/// assert_eq!(core.mode(), ControlMode::ArmedFull);
///
/// core.update_sensor("front_door", true, t0 + Duration::from_secs(1));
/// assert_eq!(core.mode(), ControlMode::EntryDelay);
///
/// core.advance(t0 + Duration::from_secs(11));
/// assert_eq!(core.mode(), ControlMode::AlarmFull);
/// ```
pub struct AlarmCore {
    pub(crate) config: AlarmConfig,
    pub(crate) modes: ModeController,
    pub(crate) sensors: Vec<Sensor>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) trouble: TroubleTracker,
    pub(crate) timers: TimerTable,
    pub(crate) driver: OutputDriver,
    pub(crate) log: EventLog,
    pub(crate) event_tx: EventSender,
    pub(crate) flags: AlarmFlags,
    pub(crate) arm_target: Option<ArmTarget>,
    pub(crate) exit_remaining: u64,
    pub(crate) entry_remaining: u64,
    pub(crate) chirp_on: bool,
    pub(crate) last_trigger: Option<LastTrigger>,
    pub(crate) open_sensors: Vec<String>,
    pub(crate) bypassed_sensors: Vec<String>,
    pub(crate) blocked_reason: Option<String>,
}

impl AlarmCore {
    /// Build the runtime tables from `config`. A repeated sensor identifier
    /// replaces the earlier registration (last one wins).
    pub fn new(config: AlarmConfig) -> Self {
        let (event_tx, _event_rx) = event_channel(EVENT_CHANNEL_CAPACITY);

        let mut sensors: Vec<Sensor> = Vec::with_capacity(config.sensors.len());
        let mut index = HashMap::new();
        for def in &config.sensors {
            let sensor = Sensor::new(def.clone(), config.default_debounce_ms);
            match index.get(&def.id) {
                Some(&i) => {
                    warn!("Duplicate sensor id {}; last registration wins", def.id);
                    sensors[i] = sensor;
                }
                None => {
                    index.insert(def.id.clone(), sensors.len());
                    sensors.push(sensor);
                }
            }
        }

        let driver = OutputDriver::new(config.outputs.clone());
        info!(
            "Alarm core loaded: {} sensors, {} outputs",
            sensors.len(),
            driver.outputs().len()
        );

        Self {
            config,
            modes: ModeController::new(),
            sensors,
            index,
            trouble: TroubleTracker::new(),
            timers: TimerTable::new(),
            driver,
            log: EventLog::new(),
            event_tx,
            flags: AlarmFlags::default(),
            arm_target: None,
            exit_remaining: 0,
            entry_remaining: 0,
            chirp_on: false,
            last_trigger: None,
            open_sensors: Vec::new(),
            bypassed_sensors: Vec::new(),
            blocked_reason: None,
        }
    }

    /// Subscribe to core events.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    /// Write every output once with its value for the current state.
    /// Call after subscribing so the external layer starts in sync.
    pub fn start(&mut self) {
        let ctx = self.output_context();
        for write in self.driver.apply_all(&ctx) {
            let _ = self.event_tx.send(CoreEvent::OutputWritten(write));
        }
    }

    // --- Accessors ---

    pub fn config(&self) -> &AlarmConfig {
        &self.config
    }

    pub fn mode(&self) -> ControlMode {
        self.modes.current()
    }

    pub fn events(&self) -> &EventLog {
        &self.log
    }

    pub fn trouble(&self) -> &TroubleTracker {
        &self.trouble
    }

    pub fn sensor(&self, id: &str) -> Option<&Sensor> {
        self.index.get(id).map(|&i| &self.sensors[i])
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn is_timer_active(&self, kind: TimerKind) -> bool {
        self.timers.is_active(kind)
    }

    pub fn active_timers(&self) -> usize {
        self.timers.len()
    }

    /// When [`advance`](Self::advance) next has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Snapshot of the published state.
    pub fn status(&self) -> AlarmStatus {
        AlarmStatus {
            mode: self.modes.current(),
            arm_target: self.arm_target,
            alarm_active: self.flags.alarm_active,
            outputs_active: self.flags.outputs_active,
            silenced: self.flags.silenced,
            silent_active: self.flags.silent_active,
            silent_events: self.flags.silent_events,
            exit_remaining_sec: self.exit_remaining,
            entry_remaining_sec: self.entry_remaining,
            last_trigger: self.last_trigger.clone(),
            trouble_active: self.trouble.is_active(),
            trouble_sensors: self.trouble.ids(),
            open_sensors: self.open_sensors.clone(),
            bypassed_sensors: self.bypassed_sensors.clone(),
            blocked_reason: self.blocked_reason.clone(),
            event_counter: self.log.counter(),
            last_event: self.log.last().cloned(),
            outputs: self.driver.status().clone(),
        }
    }

    // --- Commands ---

    /// Direct mode set from an external string.
    ///
    /// Unknown strings are rejected without any transition. Known modes are
    /// routed through the matching entry point so timers and snapshots stay
    /// consistent:
    ///
    /// | Value             | Effect                                   |
    /// |-------------------|------------------------------------------|
    /// | `disarmed`        | disarm                                   |
    /// | `arming`          | arm request toward full                  |
    /// | `armed_*`         | arm immediately, no exit delay or checks |
    /// | `entry_delay`     | start entry delay (armed modes only)     |
    /// | `alarm_pre/full`  | manual escalation from any mode          |
    pub fn set_mode(&mut self, value: &str, now: Instant) -> Result<()> {
        let target = value.parse::<ControlMode>().inspect_err(|_| {
            warn!("Rejecting unknown mode {value:?}");
        })?;
        let current = self.modes.current();
        if target == current {
            debug!("Mode already {current}, ignoring");
            return Ok(());
        }

        match target {
            ControlMode::Disarmed => {
                self.disarm(now);
                Ok(())
            }
            ControlMode::Arming => self.arm(ArmTarget::Full, now),
            ControlMode::ArmedFull | ControlMode::ArmedPerimeter => {
                if matches!(current, ControlMode::EntryDelay) || current.is_alarm() {
                    return Err(self.reject(target));
                }
                let arm_target = if target == ControlMode::ArmedFull {
                    ArmTarget::Full
                } else {
                    ArmTarget::Perimeter
                };
                self.timers.cancel_all(&TimerKind::SEQUENCE);
                self.chirp_on = false;
                for sensor in &mut self.sensors {
                    sensor.reset_cycle();
                }
                self.open_sensors.clear();
                self.bypassed_sensors.clear();
                self.blocked_reason = None;
                self.arm_target = Some(arm_target);
                self.finalize_arming(now);
                Ok(())
            }
            ControlMode::EntryDelay => {
                if !current.is_armed() {
                    return Err(self.reject(target));
                }
                self.start_entry_delay(now);
                Ok(())
            }
            ControlMode::AlarmPre => {
                self.start_pre_alarm(reason::MANUAL, now);
                Ok(())
            }
            ControlMode::AlarmFull => {
                self.start_full_alarm(reason::MANUAL, now);
                Ok(())
            }
        }
    }

    /// Toggle the siren mute. Idempotent.
    pub fn set_silenced(&mut self, silenced: bool) {
        if self.flags.silenced == silenced {
            return;
        }
        self.flags.silenced = silenced;
        let kind = if silenced { EventKind::Silenced } else { EventKind::Unsilenced };
        self.record(kind, None, if silenced { "Sirens silenced" } else { "Sirens unsilenced" });
        self.refresh_outputs();
    }

    /// Fire every timer whose deadline is at or before `now`.
    ///
    /// Each handler sees its own deadline as the current time, so chained
    /// timers (entry delay, then pre-alarm) are scheduled without drift.
    pub fn advance(&mut self, now: Instant) {
        while let Some((kind, at)) = self.timers.pop_due(now) {
            self.on_timer(kind, at);
        }
    }

    fn on_timer(&mut self, kind: TimerKind, at: Instant) {
        debug!("Timer {:?} fired", kind);
        match kind {
            TimerKind::ExitDelay => self.finalize_arming(at),
            TimerKind::ExitCountdown => {
                self.exit_remaining = self.exit_remaining.saturating_sub(1);
                let _ = self.event_tx.send(CoreEvent::ExitCountdown(self.exit_remaining));
                if self.exit_remaining > 0 {
                    self.timers.schedule(TimerKind::ExitCountdown, at, COUNTDOWN_TICK);
                }
            }
            TimerKind::EntryDelay => self.escalate(reason::ENTRY_DELAY_ELAPSED, at),
            TimerKind::EntryCountdown => {
                self.entry_remaining = self.entry_remaining.saturating_sub(1);
                let _ = self.event_tx.send(CoreEvent::EntryCountdown(self.entry_remaining));
                if self.entry_remaining > 0 {
                    self.timers.schedule(TimerKind::EntryCountdown, at, COUNTDOWN_TICK);
                }
            }
            TimerKind::PreAlarm => self.start_full_alarm(reason::ALARM_PRE_ELAPSED, at),
            TimerKind::AlarmDuration => self.end_alarm_outputs(),
            TimerKind::SilentHold => {
                self.flags.silent_active = false;
            }
            TimerKind::ChirpToggle => {
                self.chirp_on = !self.chirp_on;
                self.refresh_outputs();
                let interval = Duration::from_millis(self.config.chirp_interval_ms);
                self.timers.schedule(TimerKind::ChirpToggle, at, interval);
            }
            TimerKind::ChirpStop => self.stop_chirp(),
        }
    }

    // --- Shared plumbing for the sequencer, escalation and monitor ---

    pub(crate) fn reject(&self, target: ControlMode) -> AlarmError {
        let current = self.modes.current();
        warn!("Rejecting transition {current} -> {target}");
        AlarmError::TransitionRejected {
            from: current.to_string(),
            to: target.to_string(),
        }
    }

    /// Commit `mode`, publish the change and recompute outputs.
    pub(crate) fn commit(&mut self, mode: ControlMode) -> bool {
        match self.modes.commit(mode) {
            Some(from) => {
                let _ = self.event_tx.send(CoreEvent::ModeChanged { from, to: mode });
                self.refresh_outputs();
                true
            }
            None => false,
        }
    }

    /// Append an event record, log it and publish it.
    pub(crate) fn record(&mut self, kind: EventKind, sensor: Option<usize>, message: impl Into<String>) {
        let sensor_ref = sensor.map(|i| SensorRef {
            id: &self.sensors[i].def.id,
            name: &self.sensors[i].def.name,
        });
        let record = self.log.append(kind, self.modes.current(), sensor_ref, message);
        match record.severity {
            Severity::Alarm => error!("[{}] {}", kind.as_str(), record.message),
            Severity::Warning => warn!("[{}] {}", kind.as_str(), record.message),
            Severity::Info => info!("[{}] {}", kind.as_str(), record.message),
        }
        let _ = self.event_tx.send(CoreEvent::Record(record));
    }

    pub(crate) fn set_last_trigger(&mut self, idx: usize, why: &str) {
        let def = &self.sensors[idx].def;
        self.last_trigger = Some(LastTrigger {
            sensor_id: def.id.clone(),
            sensor_name: def.name.clone(),
            timestamp: Utc::now(),
            reason: why.to_string(),
        });
    }

    pub(crate) fn output_context(&self) -> OutputContext {
        OutputContext {
            mode: self.modes.current(),
            outputs_active: self.flags.outputs_active,
            silenced: self.flags.silenced,
            chirp_on: self.chirp_on,
        }
    }

    pub(crate) fn refresh_outputs(&mut self) {
        let ctx = self.output_context();
        for write in self.driver.recompute(&ctx) {
            let _ = self.event_tx.send(CoreEvent::OutputWritten(write));
        }
    }

    /// Start a chirp sequence lasting `seconds`. No-op without chirp outputs.
    pub(crate) fn start_chirp(&mut self, seconds: u64, now: Instant) {
        if seconds == 0 || !self.driver.has_chirp_outputs() {
            return;
        }
        self.chirp_on = true;
        self.refresh_outputs();
        let interval = Duration::from_millis(self.config.chirp_interval_ms);
        self.timers.schedule(TimerKind::ChirpToggle, now, interval);
        self.timers.schedule(TimerKind::ChirpStop, now, Duration::from_secs(seconds));
    }

    pub(crate) fn stop_chirp(&mut self) {
        self.timers.cancel_all(&TimerKind::CHIRP);
        if self.chirp_on {
            self.chirp_on = false;
            self.refresh_outputs();
        }
    }

    /// Whether sensor `idx` is monitored under the current arming target.
    pub(crate) fn is_relevant(&self, idx: usize) -> bool {
        self.arm_target
            .is_some_and(|t| self.sensors[idx].def.monitored_in(t.mask()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::output::{OutputDefinition, OutputKind, OutputValue};
    use crate::devices::sensor::{SensorDefinition, SensorPolicy};

    fn core() -> AlarmCore {
        AlarmCore::new(
            AlarmConfig::builder()
                .exit_delay_sec(0)
                .entry_delay_sec(5)
                .sensor(SensorDefinition::new("door", SensorPolicy::EntryDelay))
                .output(OutputDefinition::new("siren", OutputKind::Siren))
                .build(),
        )
    }

    #[test]
    fn test_duplicate_sensor_last_wins() {
        let core = AlarmCore::new(
            AlarmConfig::builder()
                .sensor(SensorDefinition::new("door", SensorPolicy::Instant))
                .sensor(SensorDefinition::new("window", SensorPolicy::Instant))
                .sensor(SensorDefinition::new("door", SensorPolicy::Silent))
                .build(),
        );
        assert_eq!(core.sensors().len(), 2);
        assert_eq!(core.sensor("door").unwrap().def.policy, SensorPolicy::Silent);
    }

    #[test]
    fn test_set_mode_rejects_unknown() {
        let mut core = core();
        let err = core.set_mode("party", Instant::now()).unwrap_err();
        assert!(matches!(err, AlarmError::InvalidMode { .. }));
        assert_eq!(core.mode(), ControlMode::Disarmed);
        assert_eq!(core.events().counter(), 0);
    }

    #[test]
    fn test_set_mode_entry_delay_requires_armed() {
        let mut core = core();
        let err = core.set_mode("entry_delay", Instant::now()).unwrap_err();
        assert!(matches!(err, AlarmError::TransitionRejected { .. }));
        assert_eq!(core.mode(), ControlMode::Disarmed);
    }

    #[test]
    fn test_set_mode_armed_skips_checks() {
        let mut core = core();
        let t0 = Instant::now();
        core.update_sensor("door", true, t0);
        core.set_mode("armed_perimeter", t0).unwrap();
        assert_eq!(core.mode(), ControlMode::ArmedPerimeter);
        assert_eq!(core.status().arm_target, Some(ArmTarget::Perimeter));
    }

    #[test]
    fn test_set_mode_manual_alarm() {
        let mut core = core();
        core.start();
        core.set_mode("alarm_full", Instant::now()).unwrap();
        let status = core.status();
        assert_eq!(status.mode, ControlMode::AlarmFull);
        assert!(status.alarm_active);
        assert_eq!(status.outputs.get("siren"), Some(&OutputValue::Bool(true)));
    }

    #[test]
    fn test_silence_toggle_is_idempotent() {
        let mut core = core();
        core.set_mode("alarm_full", Instant::now()).unwrap();
        core.set_silenced(true);
        core.set_silenced(true);
        let kinds = core.events().kinds();
        assert_eq!(kinds.iter().filter(|k| **k == EventKind::Silenced).count(), 1);
        assert_eq!(core.status().outputs.get("siren"), Some(&OutputValue::Bool(false)));
    }

    #[test]
    fn test_set_mode_armed_keeps_silent_hold() {
        let mut core = AlarmCore::new(
            AlarmConfig::builder()
                .silent_hold_sec(5)
                .sensor(SensorDefinition::new("safe", SensorPolicy::Silent))
                .build(),
        );
        let t0 = Instant::now();
        core.update_sensor("safe", false, t0);
        core.update_sensor("safe", true, t0);
        core.set_mode("armed_full", t0 + Duration::from_secs(1)).unwrap();
        assert!(core.status().silent_active);

        core.advance(t0 + Duration::from_secs(3600));
        assert!(!core.status().silent_active);
    }

    #[test]
    fn test_start_writes_every_output() {
        let mut core = core();
        let mut rx = core.subscribe();
        core.start();
        match rx.try_recv() {
            Ok(CoreEvent::OutputWritten(w)) => {
                assert_eq!(w.id, "siren");
                assert_eq!(w.value, OutputValue::Bool(false));
                assert!(w.ack);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
