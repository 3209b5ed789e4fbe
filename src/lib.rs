// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core
//
//! # alarm-core
//!
//! Security alarm control core: turns boolean-like sensor readings and a
//! small configuration (delays, sensor policies, outputs) into a supervised
//! arm / disarm / alarm lifecycle.
//!
//! - debounce, trouble detection for unreadable sensors, baseline tolerance
//! - arming with exit delay, open-sensor blocking and auto-bypass
//! - entry delay, pre-alarm and full alarm with their own timers
//! - output values (sirens respect silence, chirp outputs beep during delays)
//! - a structured event log with a monotonic counter
//!
//! [`AlarmCore`] is a plain state object driven by explicit instants, which
//! keeps it deterministic under test. [`AlarmController`] runs it on a tokio
//! task for real use.
//!
//! ## Quick Start
//!
//! ```no_run
//! use alarm_core::{AlarmConfig, AlarmController, AlarmCore, ArmTarget, SensorDefinition, SensorPolicy};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AlarmConfig::builder()
//!         .exit_delay_sec(30)
//!         .entry_delay_sec(20)
//!         .sensor(SensorDefinition::new("front_door", SensorPolicy::EntryDelay))
//!         .build();
//!
//!     let core = AlarmCore::new(config);
//!     let mut events = core.subscribe();
//!     let controller = AlarmController::spawn(core);
//!
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     controller.arm(ArmTarget::Full).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     controller.disarm().await?;
//!     Ok(())
//! }
//! ```

pub mod arming;
pub mod config;
pub mod constants;
pub mod controller;
pub mod engine;
pub mod devices;
pub mod driver;
pub mod error;
pub mod escalation;
pub mod event;
pub mod mode;
pub mod monitor;
pub mod normalize;
pub mod status;
pub mod timer;
pub mod trouble;

// Re-exports for convenience
pub use config::{AlarmConfig, AlarmConfigBuilder};
pub use controller::AlarmController;
pub use engine::AlarmCore;
pub use devices::output::{OutputDefinition, OutputKind, OutputValue, OutputWrite};
pub use devices::sensor::{ModeMask, SensorDefinition, SensorPolicy};
pub use error::{AlarmError, Result};
pub use event::{CoreEvent, EventKind, EventReceiver, EventRecord, Severity};
pub use mode::{ArmTarget, ControlMode};
pub use monitor::SensorOutcome;
pub use normalize::{normalize, RawValue, Reading};
pub use status::{AlarmStatus, LastTrigger};
pub use timer::TimerKind;
