// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::constants::{reason, COUNTDOWN_TICK};
use crate::engine::AlarmCore;
use crate::devices::sensor::SensorPolicy;
use crate::event::{CoreEvent, EventKind};
use crate::mode::ControlMode;
use crate::timer::TimerKind;

/// How the monitor decided that a sensor fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TriggerOrigin {
    /// Rising edge against the previous recorded value.
    Edge,
    /// Value differs from the one captured when arming completed.
    StateChange,
}

impl AlarmCore {
    /// Dispatch a fired sensor on its policy and the current mode. Both
    /// trigger origins go through here.
    pub(crate) fn handle_trigger(&mut self, idx: usize, origin: TriggerOrigin, now: Instant) {
        let policy = self.sensors[idx].def.policy;
        let mode = self.modes.current();
        let why = match (origin, policy) {
            (_, SensorPolicy::Silent) => reason::SENSOR_SILENT,
            (TriggerOrigin::StateChange, _) => reason::SENSOR_STATE_CHANGE,
            (TriggerOrigin::Edge, SensorPolicy::EntryDelay) => reason::SENSOR_ENTRY_DELAY,
            (TriggerOrigin::Edge, SensorPolicy::Instant) => reason::SENSOR_INSTANT,
        };

        if policy == SensorPolicy::Silent {
            self.silent_event(idx, now);
            return;
        }

        match mode {
            ControlMode::Disarmed | ControlMode::Arming => {
                debug!("Sensor {} fired while {mode}, ignored", self.sensors[idx].def.id);
            }
            ControlMode::AlarmPre | ControlMode::AlarmFull => {
                self.set_last_trigger(idx, why);
            }
            _ if !self.is_relevant(idx) => {
                debug!("Sensor {} not monitored in {mode}", self.sensors[idx].def.id);
            }
            ControlMode::EntryDelay => {
                if policy == SensorPolicy::Instant {
                    self.set_last_trigger(idx, why);
                    self.escalate(why, now);
                }
            }
            ControlMode::ArmedFull | ControlMode::ArmedPerimeter => {
                self.set_last_trigger(idx, why);
                match policy {
                    SensorPolicy::EntryDelay => self.start_entry_delay(now),
                    _ => self.escalate(why, now),
                }
            }
        }
    }

    /// Start the entry delay; escalates at once when the delay is zero.
    pub(crate) fn start_entry_delay(&mut self, now: Instant) {
        self.timers.cancel_all(&TimerKind::ENTRY);
        self.commit(ControlMode::EntryDelay);
        let delay = self.config.entry_delay_sec;
        let msg = match &self.last_trigger {
            Some(t) => format!("Entry delay {delay}s started by {}", t.sensor_name),
            None => format!("Entry delay {delay}s started"),
        };
        let sensor = self
            .last_trigger
            .as_ref()
            .and_then(|t| self.index.get(&t.sensor_id).copied());
        self.record(EventKind::EntryDelayStarted, sensor, msg);

        if delay == 0 {
            self.escalate(reason::ENTRY_DELAY_ELAPSED, now);
            return;
        }
        self.entry_remaining = delay;
        let _ = self.event_tx.send(CoreEvent::EntryCountdown(delay));
        self.timers.schedule(TimerKind::EntryCountdown, now, COUNTDOWN_TICK);
        self.timers.schedule(TimerKind::EntryDelay, now, Duration::from_secs(delay));
        self.start_chirp(self.config.chirp_sec, now);
    }

    /// Leave the entry delay toward the alarm.
    pub(crate) fn escalate(&mut self, why: &str, now: Instant) {
        self.timers.cancel_all(&TimerKind::ENTRY);
        self.entry_remaining = 0;
        self.start_pre_alarm(why, now);
    }

    /// Pre-alarm, or straight to full alarm when no pre-alarm is configured.
    pub(crate) fn start_pre_alarm(&mut self, why: &str, now: Instant) {
        let duration = self.config.pre_alarm_sec;
        if duration == 0 {
            self.start_full_alarm(why, now);
            return;
        }
        self.timers.cancel_all(&TimerKind::ENTRY);
        self.timers.cancel(TimerKind::PreAlarm);
        self.stop_chirp();
        self.entry_remaining = 0;
        self.flags.alarm_active = true;
        self.commit(ControlMode::AlarmPre);
        self.record(EventKind::AlarmPreStarted, None, format!("Pre-alarm {duration}s ({why})"));
        self.timers.schedule(TimerKind::PreAlarm, now, Duration::from_secs(duration));
    }

    pub(crate) fn start_full_alarm(&mut self, why: &str, now: Instant) {
        self.timers.cancel_all(&TimerKind::ENTRY);
        self.timers.cancel_all(&[TimerKind::PreAlarm, TimerKind::AlarmDuration]);
        self.stop_chirp();
        self.entry_remaining = 0;
        self.flags.alarm_active = true;
        self.flags.outputs_active = true;
        self.commit(ControlMode::AlarmFull);
        self.refresh_outputs();
        self.record(EventKind::AlarmFullStarted, None, format!("ALARM ({why})"));

        let duration = self.config.alarm_duration_sec;
        if duration > 0 {
            self.timers.schedule(TimerKind::AlarmDuration, now, Duration::from_secs(duration));
        }
    }

    /// Alarm duration elapsed: outputs go quiet, the mode stays.
    pub(crate) fn end_alarm_outputs(&mut self) {
        self.flags.outputs_active = false;
        self.refresh_outputs();
        let duration = self.config.alarm_duration_sec;
        self.record(
            EventKind::AlarmOutputsTimeout,
            None,
            format!("Alarm outputs off after {duration}s, still in alarm until disarmed"),
        );
    }

    /// A silent sensor fired. Never changes the mode.
    pub(crate) fn silent_event(&mut self, idx: usize, now: Instant) {
        self.flags.silent_events += 1;
        self.flags.silent_active = true;
        self.set_last_trigger(idx, reason::SENSOR_SILENT);
        let msg = format!(
            "Silent event from {} (#{})",
            self.sensors[idx].def.name, self.flags.silent_events
        );
        self.record(EventKind::SilentEvent, Some(idx), msg);

        let hold = self.config.silent_hold_sec;
        if hold > 0 {
            self.timers.schedule(TimerKind::SilentHold, now, Duration::from_secs(hold));
        }
    }
}
