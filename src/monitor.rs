// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::engine::AlarmCore;
use crate::escalation::TriggerOrigin;
use crate::event::EventKind;
use crate::normalize::{normalize, RawValue, Reading};

/// What the sensor pipeline did with one raw update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorOutcome {
    /// No sensor with that identifier.
    Unknown,
    /// Inside the debounce window; dropped without touching any state.
    Debounced,
    /// Could not be normalized; the sensor is now in trouble.
    Unreadable,
    /// First reading after arming became the baseline.
    BaselineAdopted,
    /// Same as the baseline captured for this arming cycle.
    BaselineUnchanged,
    /// Recorded, but the sensor is bypassed for this arming cycle.
    Bypassed,
    /// Differs from the value captured when arming completed.
    StateChange,
    /// Rising edge handed to the trigger dispatcher.
    Edge,
    /// Recorded without a trigger.
    NoEdge,
}

impl AlarmCore {
    /// Feed one raw value for sensor `id` through the pipeline:
    /// debounce, normalize, record, baseline tolerance, bypass, arming
    /// state change, edge detection. The first step that applies decides
    /// the outcome.
    pub fn update_sensor(&mut self, id: &str, raw: impl Into<RawValue>, now: Instant) -> SensorOutcome {
        let Some(&idx) = self.index.get(id) else {
            debug!("Update for unknown sensor {id}");
            return SensorOutcome::Unknown;
        };
        let raw = raw.into();

        if self.sensors[idx].is_debounced(now) {
            trace!("Sensor {id}: debounced {:?}", raw);
            return SensorOutcome::Debounced;
        }

        let reading = normalize(&raw, self.sensors[idx].def.invert);
        self.sensors[idx].last_raw = Some(raw);
        let value = match reading {
            Reading::Readable(v) => v,
            Reading::Unreadable => {
                self.mark_trouble(idx);
                return SensorOutcome::Unreadable;
            }
        };

        self.clear_trouble(idx);
        let sensor = &mut self.sensors[idx];
        sensor.last_event = Some(now);
        let previous = sensor.last_value.replace(value);
        debug!("Sensor {id}: {:?} -> {value}", previous);

        let mode = self.modes.current();
        if self.config.use_baseline_snapshot && mode.is_armed() {
            let sensor = &mut self.sensors[idx];
            match sensor.baseline {
                None => {
                    sensor.baseline = Some(value);
                    return SensorOutcome::BaselineAdopted;
                }
                Some(baseline) if baseline == value => return SensorOutcome::BaselineUnchanged,
                Some(_) => {
                    // Refreshed baseline also becomes the arming reference.
                    sensor.baseline = Some(value);
                    if sensor.snapshot.is_some() {
                        sensor.snapshot = Some(value);
                    }
                }
            }
        }

        if self.sensors[idx].bypassed {
            return SensorOutcome::Bypassed;
        }

        if mode.is_post_arm() && self.is_relevant(idx) {
            let sensor = &mut self.sensors[idx];
            if sensor.snapshot.is_some_and(|s| s != value) {
                sensor.snapshot = None;
                self.handle_trigger(idx, TriggerOrigin::StateChange, now);
                return SensorOutcome::StateChange;
            }
        }

        match previous {
            Some(prev) if prev != value && value => {
                self.handle_trigger(idx, TriggerOrigin::Edge, now);
                SensorOutcome::Edge
            }
            _ => SensorOutcome::NoEdge,
        }
    }

    /// Put sensor `idx` into trouble. Emits only on an actual change.
    pub(crate) fn mark_trouble(&mut self, idx: usize) {
        self.sensors[idx].last_value = None;
        if self.trouble.mark(&self.sensors[idx].def.id) {
            let msg = format!("Sensor {} reports an unreadable value", self.sensors[idx].def.name);
            self.record(EventKind::TroubleAdded, Some(idx), msg);
        }
    }

    pub(crate) fn clear_trouble(&mut self, idx: usize) {
        if self.trouble.clear(&self.sensors[idx].def.id) {
            let msg = format!("Sensor {} readable again", self.sensors[idx].def.name);
            self.record(EventKind::TroubleRemoved, Some(idx), msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::AlarmConfig;
    use crate::devices::sensor::{SensorDefinition, SensorPolicy};
    use crate::mode::ControlMode;

    fn core(debounce_ms: u64) -> AlarmCore {
        AlarmCore::new(
            AlarmConfig::builder()
                .exit_delay_sec(0)
                .default_debounce_ms(debounce_ms)
                .sensor(SensorDefinition::new("door", SensorPolicy::Instant))
                .sensor(SensorDefinition::new("window", SensorPolicy::Instant).invert(true))
                .build(),
        )
    }

    #[test]
    fn test_unknown_sensor() {
        let mut core = core(0);
        assert_eq!(core.update_sensor("garage", true, Instant::now()), SensorOutcome::Unknown);
    }

    #[test]
    fn test_debounce_drops_update_entirely() {
        let mut core = core(500);
        let t0 = Instant::now();
        assert_eq!(core.update_sensor("door", false, t0), SensorOutcome::NoEdge);
        assert_eq!(
            core.update_sensor("door", true, t0 + Duration::from_millis(100)),
            SensorOutcome::Debounced
        );
        let sensor = core.sensor("door").unwrap();
        assert_eq!(sensor.last_value, Some(false));
        assert_eq!(sensor.last_raw, Some(RawValue::Bool(false)));
        assert_eq!(sensor.last_event, Some(t0));
    }

    #[test]
    fn test_unreadable_marks_trouble_once() {
        let mut core = core(0);
        let t0 = Instant::now();
        core.update_sensor("door", true, t0);
        assert_eq!(core.update_sensor("door", "yes", t0), SensorOutcome::Unreadable);
        assert_eq!(core.update_sensor("door", RawValue::Null, t0), SensorOutcome::Unreadable);

        assert!(core.trouble().contains("door"));
        assert_eq!(core.sensor("door").unwrap().last_value, None);
        let added = core.events().kinds().iter().filter(|k| **k == EventKind::TroubleAdded).count();
        assert_eq!(added, 1);

        assert_eq!(core.update_sensor("door", 0i64, t0), SensorOutcome::NoEdge);
        assert!(!core.trouble().is_active());
        assert_eq!(core.events().last().map(|r| r.kind), Some(EventKind::TroubleRemoved));
    }

    #[test]
    fn test_unreadable_is_not_debounced() {
        let mut core = core(1000);
        let t0 = Instant::now();
        core.update_sensor("door", false, t0);
        // An unreadable value does not move the debounce window.
        assert_eq!(
            core.update_sensor("door", "garbage", t0 + Duration::from_secs(2)),
            SensorOutcome::Unreadable
        );
        assert_eq!(
            core.update_sensor("door", true, t0 + Duration::from_millis(2100)),
            SensorOutcome::NoEdge
        );
        assert!(!core.trouble().is_active());
    }

    #[test]
    fn test_inverted_sensor_edge() {
        let mut core = core(0);
        let t0 = Instant::now();
        core.update_sensor("window", true, t0);
        assert_eq!(core.sensor("window").unwrap().last_value, Some(false));
        assert_eq!(core.update_sensor("window", false, t0), SensorOutcome::Edge);
        // Disarmed: edges are detected but never escalate.
        assert_eq!(core.mode(), ControlMode::Disarmed);
    }

    #[test]
    fn test_first_reading_is_never_an_edge() {
        let mut core = core(0);
        assert_eq!(core.update_sensor("door", true, Instant::now()), SensorOutcome::NoEdge);
    }
}
