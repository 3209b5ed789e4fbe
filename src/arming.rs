// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::constants::{reason, COUNTDOWN_TICK};
use crate::engine::AlarmCore;
use crate::error::Result;
use crate::event::{CoreEvent, EventKind};
use crate::mode::{ArmTarget, ControlMode};
use crate::normalize::{normalize, Reading};
use crate::timer::TimerKind;

impl AlarmCore {
    /// Arm request toward `target`.
    ///
    /// Repeating a request that is already in effect (arming toward, or
    /// armed in, the same target) is a no-op. Requests while an entry delay
    /// or alarm is running are rejected; disarm first.
    pub fn arm(&mut self, target: ArmTarget, now: Instant) -> Result<()> {
        let current = self.modes.current();
        if current == target.armed_mode() || (current == ControlMode::Arming && self.arm_target == Some(target)) {
            debug!("Arm {} already in effect", target.as_str());
            return Ok(());
        }
        if current == ControlMode::EntryDelay || current.is_alarm() {
            return Err(self.reject(target.armed_mode()));
        }

        self.timers.cancel_all(&TimerKind::SEQUENCE);
        self.stop_chirp();
        self.exit_remaining = 0;
        for sensor in &mut self.sensors {
            sensor.reset_cycle();
        }
        self.bypassed_sensors.clear();
        self.blocked_reason = None;

        let open = self.open_sensors(target);
        self.open_sensors = open.iter().map(|&i| self.sensors[i].def.id.clone()).collect();

        if !open.is_empty() {
            if self.config.block_arming_if_open {
                self.block_arming(&open);
                return Ok(());
            }
            if self.config.auto_bypass_open_on_arming {
                let fixed: Vec<usize> = open
                    .iter()
                    .copied()
                    .filter(|&i| !self.sensors[i].def.bypassable)
                    .collect();
                if self.config.strict_bypass && !fixed.is_empty() {
                    self.block_arming(&fixed);
                    return Ok(());
                }
                for &i in &open {
                    if self.sensors[i].def.bypassable {
                        self.bypass(i);
                    } else {
                        warn!(
                            "Sensor {} is open and not bypassable; arming anyway",
                            self.sensors[i].def.id
                        );
                    }
                }
            }
        }

        self.arm_target = Some(target);
        self.commit(ControlMode::Arming);
        self.record(
            EventKind::ArmingStarted,
            None,
            format!("Arming {} (exit delay {}s)", target.as_str(), self.config.exit_delay_sec),
        );

        let exit_delay = self.config.exit_delay_sec;
        if exit_delay == 0 {
            self.finalize_arming(now);
            return Ok(());
        }
        self.exit_remaining = exit_delay;
        let _ = self.event_tx.send(CoreEvent::ExitCountdown(exit_delay));
        self.timers.schedule(TimerKind::ExitCountdown, now, COUNTDOWN_TICK);
        self.timers.schedule(TimerKind::ExitDelay, now, Duration::from_secs(exit_delay));
        self.start_chirp(self.config.chirp_sec, now);
        Ok(())
    }

    /// Complete arming: capture the arming snapshot and commit the armed mode.
    pub(crate) fn finalize_arming(&mut self, _now: Instant) {
        self.timers.cancel_all(&TimerKind::EXIT);
        self.stop_chirp();
        self.exit_remaining = 0;

        let Some(target) = self.arm_target else {
            warn!("Exit delay finished without an arming target");
            return;
        };
        // The baseline is left empty: the first reading after arming fills it.
        for sensor in &mut self.sensors {
            if sensor.bypassed || !sensor.def.monitored_in(target.mask()) {
                continue;
            }
            sensor.snapshot = sensor.last_value;
            sensor.baseline = None;
        }

        self.commit(target.armed_mode());
        let msg = if self.bypassed_sensors.is_empty() {
            format!("Armed {}", target.as_str())
        } else {
            format!("Armed {} (bypassed: {})", target.as_str(), self.bypassed_sensors.join(", "))
        };
        self.record(EventKind::Armed, None, msg);
    }

    /// Disarm from any mode. Disarming while disarmed does nothing.
    pub fn disarm(&mut self, now: Instant) {
        let current = self.modes.current();
        if current == ControlMode::Disarmed {
            debug!("Already disarmed");
            return;
        }
        let was_alarm = self.flags.alarm_active;

        self.timers.cancel_all(&TimerKind::ALL);
        self.chirp_on = false;
        for sensor in &mut self.sensors {
            sensor.reset_cycle();
        }
        self.arm_target = None;
        self.exit_remaining = 0;
        self.entry_remaining = 0;
        self.flags.alarm_active = false;
        self.flags.outputs_active = false;
        self.flags.silenced = false;
        self.flags.silent_active = false;
        self.open_sensors.clear();
        self.bypassed_sensors.clear();
        self.blocked_reason = None;

        self.commit(ControlMode::Disarmed);
        self.record(EventKind::Disarmed, None, format!("Disarmed from {current}"));

        if was_alarm {
            self.start_chirp(self.config.post_alarm_chirp_sec, now);
        }
    }

    /// Mode-relevant, non-bypassed sensors currently reading their trigger
    /// value. Unreadable sensors go to trouble and are left out.
    pub(crate) fn open_sensors(&mut self, target: ArmTarget) -> Vec<usize> {
        let mut open = Vec::new();
        let mut unreadable = Vec::new();
        for (i, sensor) in self.sensors.iter().enumerate() {
            if sensor.bypassed || !sensor.def.monitored_in(target.mask()) {
                continue;
            }
            let Some(raw) = &sensor.last_raw else {
                continue;
            };
            match normalize(raw, sensor.def.invert) {
                Reading::Readable(true) => open.push(i),
                Reading::Readable(false) => {}
                Reading::Unreadable => unreadable.push(i),
            }
        }
        for i in unreadable {
            self.mark_trouble(i);
        }
        open
    }

    fn block_arming(&mut self, culprits: &[usize]) {
        let names: Vec<&str> = culprits.iter().map(|&i| self.sensors[i].def.name.as_str()).collect();
        let why = format!("{}: {}", reason::OPEN_SENSORS, names.join(", "));
        self.arm_target = None;
        self.bypassed_sensors.clear();
        self.commit(ControlMode::Disarmed);
        self.blocked_reason = Some(why.clone());
        self.record(EventKind::ArmingBlocked, None, format!("Arming blocked, {why}"));
    }

    fn bypass(&mut self, idx: usize) {
        let sensor = &mut self.sensors[idx];
        sensor.bypassed = true;
        sensor.auto_bypassed = true;
        self.bypassed_sensors.push(sensor.def.id.clone());
        let msg = format!("Sensor {} open at arming, bypassed", sensor.def.name);
        self.record(EventKind::SensorBypassed, Some(idx), msg);
    }
}
