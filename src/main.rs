// MIT License - Copyright (c) 2026 Peter Wright
// MQTT bridge

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

use alarm_core::config::AlarmToml;
use alarm_core::{
    AlarmController, AlarmCore, AlarmError, AlarmStatus, ArmTarget, ControlMode, CoreEvent, EventRecord,
    OutputValue, OutputWrite, RawValue,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "alarm2mqtt")]
#[command(about = "Security alarm control core driven over MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    mqtt: MqttToml,
    #[serde(default)]
    alarm: AlarmToml,
}

#[derive(Debug, Clone, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_sensor_prefix")]
    sensor_prefix: String,
    #[serde(default = "default_command_topic")]
    command_topic: String,
    #[serde(default = "default_publish_topic")]
    publish_topic: String,
    #[serde(default = "default_status_interval")]
    status_interval_secs: u64,
}

fn default_client_id() -> String {
    "alarm2mqtt".to_string()
}
fn default_sensor_prefix() -> String {
    "alarm/sensor".to_string()
}
fn default_command_topic() -> String {
    "alarm/cmd".to_string()
}
fn default_publish_topic() -> String {
    "alarm".to_string()
}
fn default_status_interval() -> u64 {
    60
}

fn load_config(path: &str) -> Result<Config> {
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    toml::from_str(&text).context("Failed to parse config file")
}

// ---------------------------------------------------------------------------
// MQTT JSON types
// ---------------------------------------------------------------------------

// Published messages share the flat {now, op, ...} structure

#[derive(Serialize)]
struct MqttStatus<'a> {
    now: u64,
    op: &'static str,
    state: &'a AlarmStatus,
}

#[derive(Serialize)]
struct MqttEvent<'a> {
    now: u64,
    op: &'static str,
    event: &'a EventRecord,
}

#[derive(Serialize)]
struct MqttMode {
    now: u64,
    op: &'static str,
    from: ControlMode,
    to: ControlMode,
}

#[derive(Serialize)]
struct MqttCountdown {
    now: u64,
    op: &'static str,
    remaining: u64,
}

#[derive(Serialize)]
struct MqttOutput<'a> {
    now: u64,
    op: &'static str,
    id: &'a str,
    value: &'a OutputValue,
    ack: bool,
}

// CMD_ACK response
#[derive(Serialize)]
struct MqttCmdAck {
    now: u64,
    op: &'static str,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    src: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// Inbound command (subscribed)
#[derive(Deserialize)]
struct MqttCommand {
    op: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    on: Option<bool>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

async fn publish_json(client: &AsyncClient, topic: &str, payload: &impl Serialize, retain: bool) {
    match serde_json::to_string(payload) {
        Ok(json) => {
            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, retain, json).await {
                error!("Failed to publish to {topic}: {e}");
            }
        }
        Err(e) => error!("Failed to serialize MQTT payload: {e}"),
    }
}

async fn publish_status(client: &AsyncClient, topic: &str, status: &AlarmStatus) {
    let msg = MqttStatus {
        now: now_epoch_ms(),
        op: "STATUS",
        state: status,
    };
    publish_json(client, topic, &msg, true).await;
}

async fn publish_cmd_ack(
    client: &AsyncClient,
    topic: &str,
    result: std::result::Result<Option<serde_json::Value>, AlarmError>,
    src: Option<serde_json::Value>,
) {
    let (success, data, error) = match result {
        Ok(data) => (true, data, None),
        Err(e) => (false, None, Some(e.to_string())),
    };
    let msg = MqttCmdAck {
        now: now_epoch_ms(),
        op: "CMD_ACK",
        success,
        src,
        data,
        error,
    };
    publish_json(client, topic, &msg, false).await;
}

/// Sensor payloads are JSON scalars when they parse, raw text otherwise.
fn parse_sensor_payload(payload: &[u8]) -> RawValue {
    match serde_json::from_slice::<serde_json::Value>(payload) {
        Ok(value) => RawValue::from_json(&value),
        Err(_) => RawValue::Text(String::from_utf8_lossy(payload).trim().to_string()),
    }
}

// ---------------------------------------------------------------------------
// Core event → MQTT
// ---------------------------------------------------------------------------

async fn handle_core_event(event: CoreEvent, client: &AsyncClient, topic: &str) {
    match event {
        CoreEvent::ModeChanged { from, to } => {
            let msg = MqttMode {
                now: now_epoch_ms(),
                op: "MODE",
                from,
                to,
            };
            publish_json(client, topic, &msg, false).await;
        }
        CoreEvent::Record(record) => {
            let msg = MqttEvent {
                now: now_epoch_ms(),
                op: "EVENT",
                event: &record,
            };
            publish_json(client, topic, &msg, false).await;
        }
        CoreEvent::OutputWritten(OutputWrite { id, value, ack }) => {
            let msg = MqttOutput {
                now: now_epoch_ms(),
                op: "OUTPUT",
                id: &id,
                value: &value,
                ack,
            };
            publish_json(client, &format!("{topic}/output/{id}"), &msg, true).await;
        }
        CoreEvent::ExitCountdown(remaining) => {
            let msg = MqttCountdown {
                now: now_epoch_ms(),
                op: "EXIT_COUNTDOWN",
                remaining,
            };
            publish_json(client, topic, &msg, false).await;
        }
        CoreEvent::EntryCountdown(remaining) => {
            let msg = MqttCountdown {
                now: now_epoch_ms(),
                op: "ENTRY_COUNTDOWN",
                remaining,
            };
            publish_json(client, topic, &msg, false).await;
        }
    }
}

// ---------------------------------------------------------------------------
// MQTT command handler
// ---------------------------------------------------------------------------

async fn handle_command(
    payload_str: &str,
    cmd: MqttCommand,
    client: &AsyncClient,
    topic: &str,
    controller: &AlarmController,
) {
    // Parse the raw payload as a JSON value for the CMD_ACK src field
    let src_json = serde_json::from_str::<serde_json::Value>(payload_str).ok();

    let result = match cmd.op.as_str() {
        "SNAPSHOT" => {
            debug!("Command: SNAPSHOT");
            let status = controller.status();
            publish_status(client, topic, &status).await;
            Ok(serde_json::to_value(&status).ok())
        }
        "PING" => {
            info!("Command: PING");
            Ok(None)
        }
        "ARM_FULL" => {
            info!("Command: ARM_FULL");
            controller.arm(ArmTarget::Full).await.map(|_| None)
        }
        "ARM_PERIMETER" => {
            info!("Command: ARM_PERIMETER");
            controller.arm(ArmTarget::Perimeter).await.map(|_| None)
        }
        "DISARM" => {
            info!("Command: DISARM");
            controller.disarm().await.map(|_| None)
        }
        "SET_MODE" => match cmd.mode {
            Some(mode) => {
                info!("Command: SET_MODE {mode}");
                controller.set_mode(mode).await.map(|_| None)
            }
            None => {
                warn!("SET_MODE: missing mode");
                Err(AlarmError::InvalidMode { value: String::new() })
            }
        },
        "SILENCE" => {
            let on = cmd.on.unwrap_or(true);
            info!("Command: SILENCE {on}");
            controller.set_silenced(on).await.map(|_| None)
        }
        other => {
            warn!("Unknown command: {other}");
            publish_json(
                client,
                topic,
                &MqttCmdAck {
                    now: now_epoch_ms(),
                    op: "CMD_ACK",
                    success: false,
                    src: src_json,
                    data: None,
                    error: Some(format!("Unknown command: {other}")),
                },
                false,
            )
            .await;
            return;
        }
    };

    if let Err(e) = &result {
        warn!("Command {} failed: {e}", cmd.op);
    }
    publish_cmd_ack(client, topic, result, src_json).await;
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=alarm_core=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let mut mqtt = config.mqtt;
    let mut alarm = config.alarm;
    let (mut mqtt_host, mut mqtt_port) = parse_mqtt_url(&mqtt.url)?;

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        // Fresh runtime state on every (re)start
        let core = AlarmCore::new(alarm.clone().into_config());
        let event_rx = core.subscribe();
        let controller = Arc::new(AlarmController::spawn(core));
        info!("Alarm core started");

        // Set up MQTT
        let mut mqtt_opts = MqttOptions::new(&mqtt.client_id, &mqtt_host, mqtt_port);
        mqtt_opts.set_keep_alive(Duration::from_secs(30));
        let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 256);

        let sensor_filter = format!("{}/+", mqtt.sensor_prefix);

        // Task 1: core event listener
        let client_events = client.clone();
        let topic_events = mqtt.publish_topic.clone();
        let event_handle = tokio::spawn(async move {
            let mut rx = event_rx;
            loop {
                match rx.recv().await {
                    Ok(event) => handle_core_event(event, &client_events, &topic_events).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Event receiver lagged, missed {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        info!("Event channel closed");
                        break;
                    }
                }
            }
        });

        // Task 2: MQTT event loop (sensor values and commands)
        let ctl_cmds = Arc::clone(&controller);
        let client_cmds = client.clone();
        let topic_cmds = mqtt.publish_topic.clone();
        let cmd_topic = mqtt.command_topic.clone();
        let sensor_prefix = format!("{}/", mqtt.sensor_prefix);
        let mqtt_handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // rumqttc does not resubscribe after a broker reconnect
                        info!("MQTT: connected, subscribing to {cmd_topic} and {sensor_filter}");
                        for filter in [&cmd_topic, &sensor_filter] {
                            if let Err(e) = client_cmds.subscribe(filter.as_str(), QoS::AtLeastOnce).await {
                                error!("Failed to subscribe to {filter}: {e}");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        if msg.topic == cmd_topic {
                            let payload = String::from_utf8_lossy(&msg.payload);
                            match serde_json::from_str::<MqttCommand>(&payload) {
                                Ok(cmd) => {
                                    if cmd.op == "SNAPSHOT" {
                                        debug!("MQTT command received: {payload}");
                                    } else {
                                        info!("MQTT command received: {payload}");
                                    }
                                    handle_command(&payload, cmd, &client_cmds, &topic_cmds, &ctl_cmds).await;
                                }
                                Err(e) => {
                                    warn!("Failed to parse MQTT command: {e}");
                                }
                            }
                        } else if let Some(id) = msg.topic.strip_prefix(&sensor_prefix) {
                            let raw = parse_sensor_payload(&msg.payload);
                            match ctl_cmds.update_sensor(id, raw).await {
                                Ok(outcome) => debug!("Sensor {id}: {outcome:?}"),
                                Err(e) if e.is_recoverable() => warn!("Sensor {id} update ignored: {e}"),
                                Err(e) => error!("Sensor {id} update failed: {e}"),
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT event loop error: {e}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        // Task 3: status publisher, on change and on a fixed interval
        let mut status_rx = controller.watch_status();
        let client_status = client.clone();
        let topic_status = mqtt.publish_topic.clone();
        let status_interval = Duration::from_secs(mqtt.status_interval_secs.max(1));
        let status_handle = tokio::spawn(async move {
            let mut ticker = interval(status_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = status_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let status = status_rx.borrow_and_update().clone();
                publish_status(&client_status, &topic_status, &status).await;
            }
        });

        // Wait for a signal
        info!("Alarm bridge running. Send SIGHUP to reload, SIGINT/SIGTERM to stop.");
        let restart = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                false
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                false
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading config and restarting...");
                true
            }
        };

        // Abort tasks
        event_handle.abort();
        mqtt_handle.abort();
        status_handle.abort();

        match Arc::try_unwrap(controller) {
            Ok(mut controller) => controller.shutdown().await,
            Err(_arc) => {
                warn!("Could not unwrap controller Arc for clean shutdown (tasks still hold references)");
            }
        }
        if let Err(e) = client.disconnect().await {
            debug!("MQTT disconnect: {e}");
        }

        if !restart {
            break;
        }

        // Reload config from disk; keep previous config on failure
        info!("Reloading config from {}", cli.config);
        match load_config(&cli.config) {
            Ok(new_config) => match parse_mqtt_url(&new_config.mqtt.url) {
                Ok((new_host, new_port)) => {
                    mqtt_host = new_host;
                    mqtt_port = new_port;
                    mqtt = new_config.mqtt;
                    alarm = new_config.alarm;
                    info!("Config reloaded successfully");
                }
                Err(e) => warn!("Invalid MQTT URL in new config, keeping previous: {e}"),
            },
            Err(e) => warn!("Failed to reload config, keeping previous: {e}"),
        }

        info!("Restarting...");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port_str) = stripped
        .rsplit_once(':')
        .context("MQTT URL must be in format mqtt://host:port")?;

    let port: u16 = port_str.parse().context("Invalid MQTT port number")?;

    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mqtt_url() {
        assert_eq!(parse_mqtt_url("mqtt://broker:1883").unwrap(), ("broker".to_string(), 1883));
        assert_eq!(parse_mqtt_url("tcp://10.0.0.2:8883").unwrap(), ("10.0.0.2".to_string(), 8883));
        assert!(parse_mqtt_url("mqtt://broker").is_err());
    }

    #[test]
    fn test_sensor_payloads() {
        assert_eq!(parse_sensor_payload(b"true"), RawValue::Bool(true));
        assert_eq!(parse_sensor_payload(b"1"), RawValue::Number(1.0));
        assert_eq!(parse_sensor_payload(b"\"false\""), RawValue::Text("false".into()));
        assert_eq!(parse_sensor_payload(b" open "), RawValue::Text("open".into()));
        assert_eq!(parse_sensor_payload(b"null"), RawValue::Null);
    }

    #[test]
    fn test_config_file() {
        let config: Config = toml::from_str(
            r#"
            [mqtt]
            url = "mqtt://localhost:1883"

            [alarm]
            exitDelaySec = 15

            [[alarm.sensors]]
            id = "front_door"
            role = "entry"
            "#,
        )
        .unwrap();
        assert_eq!(config.mqtt.command_topic, "alarm/cmd");
        assert_eq!(config.mqtt.status_interval_secs, 60);
        let alarm = config.alarm.into_config();
        assert_eq!(alarm.exit_delay_sec, 15);
        assert_eq!(alarm.sensors.len(), 1);
    }
}
