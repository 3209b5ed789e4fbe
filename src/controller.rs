// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::constants::COMMAND_CHANNEL_CAPACITY;
use crate::engine::AlarmCore;
use crate::error::{AlarmError, Result};
use crate::event::{EventReceiver, EventSender};
use crate::mode::ArmTarget;
use crate::monitor::SensorOutcome;
use crate::normalize::RawValue;
use crate::status::AlarmStatus;

enum Command {
    Sensor {
        id: String,
        raw: RawValue,
        reply: oneshot::Sender<SensorOutcome>,
    },
    Arm {
        target: ArmTarget,
        reply: oneshot::Sender<Result<()>>,
    },
    Disarm {
        reply: oneshot::Sender<()>,
    },
    SetMode {
        value: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Silence {
        on: bool,
        reply: oneshot::Sender<()>,
    },
}

/// Async handle to an [`AlarmCore`] running on its own task.
///
/// The task is the only owner of the core: sensor updates, commands and
/// timer expiries are handled one at a time in arrival order. Between
/// messages the task sleeps until the core's next timer deadline.
///
/// ```no_run
/// use alarm_core::{AlarmConfig, AlarmController, AlarmCore, ArmTarget};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AlarmConfig::from_toml_str(&std::fs::read_to_string("alarm.toml")?)?;
///     let core = AlarmCore::new(config);
///     let mut events = core.subscribe();
///     let controller = AlarmController::spawn(core);
///
///     tokio::spawn(async move {
///         while let Ok(event) = events.recv().await {
///             println!("Event: {:?}", event);
///         }
///     });
///
///     controller.update_sensor("front_door", false).await?;
///     controller.arm(ArmTarget::Full).await?;
///     Ok(())
/// }
/// ```
pub struct AlarmController {
    command_tx: mpsc::Sender<Command>,
    event_tx: EventSender,
    status_rx: watch::Receiver<AlarmStatus>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl AlarmController {
    /// Move `core` onto a new task. Every output is written once when the
    /// task starts, so subscribe on the core first to see those writes.
    pub fn spawn(core: AlarmCore) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(core.status());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let event_tx = core.event_tx.clone();

        let task = tokio::spawn(run(core, command_rx, status_tx, shutdown_rx));

        Self {
            command_tx,
            event_tx,
            status_rx,
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Subscribe to core events.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    /// Latest published status.
    pub fn status(&self) -> AlarmStatus {
        self.status_rx.borrow().clone()
    }

    /// Receiver that is notified whenever the status changes.
    pub fn watch_status(&self) -> watch::Receiver<AlarmStatus> {
        self.status_rx.clone()
    }

    /// Feed a raw sensor value. Fails with [`AlarmError::UnknownSensor`]
    /// when no sensor is configured under `id`.
    pub async fn update_sensor(&self, id: impl Into<String>, raw: impl Into<RawValue>) -> Result<SensorOutcome> {
        let id = id.into();
        let (reply, rx) = oneshot::channel();
        self.send(Command::Sensor {
            id: id.clone(),
            raw: raw.into(),
            reply,
        })
        .await?;
        match rx.await.map_err(|_| AlarmError::ChannelClosed)? {
            SensorOutcome::Unknown => Err(AlarmError::UnknownSensor { id }),
            outcome => Ok(outcome),
        }
    }

    pub async fn arm(&self, target: ArmTarget) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Arm { target, reply }).await?;
        rx.await.map_err(|_| AlarmError::ChannelClosed)?
    }

    pub async fn disarm(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Disarm { reply }).await?;
        rx.await.map_err(|_| AlarmError::ChannelClosed)
    }

    /// Direct mode set; see [`AlarmCore::set_mode`].
    pub async fn set_mode(&self, value: impl Into<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetMode {
            value: value.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| AlarmError::ChannelClosed)?
    }

    pub async fn set_silenced(&self, on: bool) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Silence { on, reply }).await?;
        rx.await.map_err(|_| AlarmError::ChannelClosed)
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(&mut self) {
        info!("Stopping alarm controller");
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| AlarmError::ChannelClosed)
    }
}

impl Drop for AlarmController {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    mut core: AlarmCore,
    mut commands: mpsc::Receiver<Command>,
    status_tx: watch::Sender<AlarmStatus>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    core.start();
    status_tx.send_replace(core.status());

    loop {
        let deadline = core.next_deadline();
        tokio::select! {
            biased;
            _ = wait_for(deadline) => {
                core.advance(Instant::now());
                publish(&core, &status_tx);
            }
            command = commands.recv() => match command {
                Some(command) => apply(&mut core, command, &status_tx),
                None => break,
            },
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    debug!("Alarm controller task finished");
}

/// Run one command. Timers already due fire first, so a command never
/// overtakes an expiry that happened before it arrived. The status is
/// published before the reply goes out, so a caller that awaited the reply
/// reads the new status.
fn apply(core: &mut AlarmCore, command: Command, status_tx: &watch::Sender<AlarmStatus>) {
    let now = Instant::now();
    core.advance(now);
    match command {
        Command::Sensor { id, raw, reply } => {
            let outcome = core.update_sensor(&id, raw, now);
            publish(core, status_tx);
            let _ = reply.send(outcome);
        }
        Command::Arm { target, reply } => {
            let result = core.arm(target, now);
            publish(core, status_tx);
            let _ = reply.send(result);
        }
        Command::Disarm { reply } => {
            core.disarm(now);
            publish(core, status_tx);
            let _ = reply.send(());
        }
        Command::SetMode { value, reply } => {
            let result = core.set_mode(&value, now);
            publish(core, status_tx);
            let _ = reply.send(result);
        }
        Command::Silence { on, reply } => {
            core.set_silenced(on);
            publish(core, status_tx);
            let _ = reply.send(());
        }
    }
}

fn publish(core: &AlarmCore, status_tx: &watch::Sender<AlarmStatus>) {
    status_tx.send_if_modified(|current| {
        let next = core.status();
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::AlarmConfig;
    use crate::devices::sensor::{SensorDefinition, SensorPolicy};
    use crate::event::{CoreEvent, EventKind};
    use crate::mode::ControlMode;

    fn controller(exit: u64, entry: u64) -> AlarmController {
        AlarmController::spawn(AlarmCore::new(
            AlarmConfig::builder()
                .exit_delay_sec(exit)
                .entry_delay_sec(entry)
                .sensor(SensorDefinition::new("door", SensorPolicy::EntryDelay))
                .build(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_delay_runs_on_task() {
        let ctl = controller(5, 10);
        ctl.update_sensor("door", false).await.unwrap();
        ctl.arm(ArmTarget::Full).await.unwrap();
        assert_eq!(ctl.status().mode, ControlMode::Arming);

        tokio::time::sleep(Duration::from_millis(5100)).await;
        assert_eq!(ctl.status().mode, ControlMode::ArmedFull);
        assert_eq!(ctl.status().exit_remaining_sec, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_delay_escalates_without_disarm() {
        let ctl = controller(0, 2);
        ctl.update_sensor("door", false).await.unwrap();
        ctl.arm(ArmTarget::Full).await.unwrap();
        ctl.update_sensor("door", true).await.unwrap();
        assert_eq!(ctl.status().mode, ControlMode::EntryDelay);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        let status = ctl.status();
        assert_eq!(status.mode, ControlMode::AlarmFull);
        assert!(status.alarm_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_cancels_entry_countdown() {
        let ctl = controller(0, 10);
        let mut events = ctl.subscribe();
        ctl.update_sensor("door", false).await.unwrap();
        ctl.arm(ArmTarget::Full).await.unwrap();
        ctl.update_sensor("door", true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        ctl.disarm().await.unwrap();

        tokio::time::sleep(Duration::from_secs(20)).await;
        let status = ctl.status();
        assert_eq!(status.mode, ControlMode::Disarmed);
        assert_eq!(status.entry_remaining_sec, 0);

        let mut ticks = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let CoreEvent::EntryCountdown(n) = event {
                ticks.push(n);
            }
        }
        assert_eq!(ticks, vec![10, 9, 8, 7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overdue_entry_delay_fires_before_disarm() {
        let ctl = controller(0, 2);
        let mut events = ctl.subscribe();
        ctl.update_sensor("door", false).await.unwrap();
        ctl.arm(ArmTarget::Full).await.unwrap();
        ctl.update_sensor("door", true).await.unwrap();

        tokio::time::advance(Duration::from_secs(3)).await;
        ctl.disarm().await.unwrap();
        assert_eq!(ctl.status().mode, ControlMode::Disarmed);

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let CoreEvent::Record(record) = event {
                kinds.push(record.kind);
            }
        }
        let alarm = kinds.iter().position(|k| *k == EventKind::AlarmFullStarted);
        let disarmed = kinds.iter().position(|k| *k == EventKind::Disarmed);
        assert!(alarm.is_some(), "no alarm before disarm: {kinds:?}");
        assert!(alarm < disarmed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_sensor_is_an_error() {
        let ctl = controller(0, 0);
        let err = ctl.update_sensor("garage", true).await.unwrap_err();
        assert!(matches!(err, AlarmError::UnknownSensor { ref id } if id == "garage"));
        assert!(err.is_recoverable());
        assert_eq!(ctl.update_sensor("door", true).await.unwrap(), SensorOutcome::NoEdge);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_mode_is_returned() {
        let ctl = controller(0, 0);
        let err = ctl.set_mode("panic").await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(ctl.status().mode, ControlMode::Disarmed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_after_shutdown() {
        let mut ctl = controller(0, 0);
        ctl.shutdown().await;
        let err = ctl.disarm().await.unwrap_err();
        assert!(matches!(err, AlarmError::ChannelClosed));
    }
}
