// Schema validation tests for MQTT wire format
//
// Most tests construct JSON values directly (independent of Rust structs)
// and validate them against the JSON Schema files in schemas/mqtt/. The
// status and event tests also serialize real core state, so a renamed
// field on the library side fails here.

use std::time::Duration;

use alarm_core::{
    AlarmConfig, AlarmCore, ArmTarget, OutputDefinition, OutputKind, SensorDefinition, SensorPolicy,
};
use serde_json::json;
use tokio::time::Instant;

fn load_schema(name: &str) -> serde_json::Value {
    let path = format!("{}/schemas/mqtt/{name}", env!("CARGO_MANIFEST_DIR"));
    let text = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read schema {path}: {e}"));
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("Failed to parse schema {path}: {e}"))
}

fn build_validator(schema_name: &str) -> jsonschema::Validator {
    let schema = load_schema(schema_name);
    jsonschema::validator_for(&schema).unwrap_or_else(|e| panic!("Failed to compile schema {schema_name}: {e}"))
}

fn validate(schema_name: &str, instance: &serde_json::Value) {
    let validator = build_validator(schema_name);
    let errors: Vec<_> = validator.iter_errors(instance).collect();
    if !errors.is_empty() {
        let msgs: Vec<String> = errors.iter().map(|e| format!("  - {e}")).collect();
        panic!(
            "Schema validation failed for {schema_name}:\n{}\nInstance: {}",
            msgs.join("\n"),
            serde_json::to_string_pretty(instance).unwrap()
        );
    }
}

fn validate_fails(schema_name: &str, instance: &serde_json::Value) {
    let validator = build_validator(schema_name);
    assert!(
        !validator.is_valid(instance),
        "Expected schema validation to fail for {schema_name}, but it passed.\nInstance: {}",
        serde_json::to_string_pretty(instance).unwrap()
    );
}

fn alarmed_core() -> AlarmCore {
    let mut core = AlarmCore::new(
        AlarmConfig::builder()
            .exit_delay_sec(0)
            .sensor(SensorDefinition::new("window", SensorPolicy::Instant).name("Kitchen window"))
            .sensor(SensorDefinition::new("pir", SensorPolicy::Instant))
            .output(OutputDefinition::new("siren", OutputKind::Siren))
            .output(OutputDefinition::new("light", OutputKind::Light).values("red", "off"))
            .build(),
    );
    core.start();
    let t0 = Instant::now();
    core.update_sensor("window", false, t0);
    core.update_sensor("pir", "broken", t0);
    core.arm(ArmTarget::Full, t0).unwrap();
    core.update_sensor("window", true, t0 + Duration::from_secs(1));
    core
}

// ---------------------------------------------------------------------------
// STATUS
// ---------------------------------------------------------------------------

#[test]
fn status_from_core_valid() {
    let status = alarmed_core().status();
    let msg = json!({
        "now": 1700000000000u64,
        "op": "STATUS",
        "state": serde_json::to_value(&status).unwrap()
    });
    validate("status.schema.json", &msg);
}

#[test]
fn status_idle_core_valid() {
    let core = AlarmCore::new(AlarmConfig::default());
    let msg = json!({
        "now": 1700000000000u64,
        "op": "STATUS",
        "state": serde_json::to_value(core.status()).unwrap()
    });
    validate("status.schema.json", &msg);
}

#[test]
fn status_wrong_op() {
    let state = serde_json::to_value(AlarmCore::new(AlarmConfig::default()).status()).unwrap();
    validate_fails("status.schema.json", &json!({"now": 1, "op": "SNAPSHOT", "state": state}));
}

#[test]
fn status_unknown_mode_rejected() {
    let mut state = serde_json::to_value(AlarmCore::new(AlarmConfig::default()).status()).unwrap();
    state["mode"] = json!("armed_away");
    validate_fails("status.schema.json", &json!({"now": 1, "op": "STATUS", "state": state}));
}

#[test]
fn status_missing_state() {
    validate_fails("status.schema.json", &json!({"now": 1, "op": "STATUS"}));
}

#[test]
fn status_timestamp_string_rejected() {
    let state = serde_json::to_value(AlarmCore::new(AlarmConfig::default()).status()).unwrap();
    validate_fails(
        "status.schema.json",
        &json!({"now": "2024-01-01T00:00:00Z", "op": "STATUS", "state": state}),
    );
}

// ---------------------------------------------------------------------------
// EVENT
// ---------------------------------------------------------------------------

#[test]
fn event_records_from_core_valid() {
    let core = alarmed_core();
    for record in core.events().recent() {
        let msg = json!({
            "now": 1700000000000u64,
            "op": "EVENT",
            "event": serde_json::to_value(record).unwrap()
        });
        validate("event.schema.json", &msg);
    }
}

#[test]
fn event_with_sensor() {
    validate(
        "event.schema.json",
        &json!({
            "now": 1700000000000u64,
            "op": "EVENT",
            "event": {
                "seq": 4,
                "type": "trouble_added",
                "mode": "disarmed",
                "sensorId": "pir",
                "sensorName": "Hall PIR",
                "timestamp": "2026-01-01T12:00:00Z",
                "severity": "warning",
                "message": "Sensor Hall PIR reports an unreadable value"
            }
        }),
    );
}

#[test]
fn event_unknown_type_rejected() {
    validate_fails(
        "event.schema.json",
        &json!({
            "now": 1,
            "op": "EVENT",
            "event": {
                "seq": 1,
                "type": "zone_open",
                "mode": "disarmed",
                "timestamp": "2026-01-01T12:00:00Z",
                "severity": "info",
                "message": ""
            }
        }),
    );
}

#[test]
fn event_bad_severity_rejected() {
    validate_fails(
        "event.schema.json",
        &json!({
            "now": 1,
            "op": "EVENT",
            "event": {
                "seq": 1,
                "type": "armed",
                "mode": "armed_full",
                "timestamp": "2026-01-01T12:00:00Z",
                "severity": "critical",
                "message": "Armed full"
            }
        }),
    );
}

#[test]
fn event_zero_seq_rejected() {
    validate_fails(
        "event.schema.json",
        &json!({
            "now": 1,
            "op": "EVENT",
            "event": {
                "seq": 0,
                "type": "armed",
                "mode": "armed_full",
                "timestamp": "2026-01-01T12:00:00Z",
                "severity": "info",
                "message": "Armed full"
            }
        }),
    );
}

// ---------------------------------------------------------------------------
// OUTPUT / MODE / COUNTDOWN
// ---------------------------------------------------------------------------

#[test]
fn output_values() {
    for value in [json!(true), json!(1), json!("red")] {
        validate(
            "output.schema.json",
            &json!({"now": 1, "op": "OUTPUT", "id": "siren", "value": value, "ack": true}),
        );
    }
}

#[test]
fn output_without_ack_rejected() {
    validate_fails(
        "output.schema.json",
        &json!({"now": 1, "op": "OUTPUT", "id": "siren", "value": true, "ack": false}),
    );
    validate_fails("output.schema.json", &json!({"now": 1, "op": "OUTPUT", "id": "siren", "value": true}));
}

#[test]
fn output_object_value_rejected() {
    validate_fails(
        "output.schema.json",
        &json!({"now": 1, "op": "OUTPUT", "id": "siren", "value": {"on": true}, "ack": true}),
    );
}

#[test]
fn mode_change() {
    validate(
        "mode.schema.json",
        &json!({"now": 1, "op": "MODE", "from": "armed_full", "to": "entry_delay"}),
    );
    validate_fails("mode.schema.json", &json!({"now": 1, "op": "MODE", "from": "armed", "to": "disarmed"}));
}

#[test]
fn countdowns() {
    validate("countdown.schema.json", &json!({"now": 1, "op": "EXIT_COUNTDOWN", "remaining": 30}));
    validate("countdown.schema.json", &json!({"now": 1, "op": "ENTRY_COUNTDOWN", "remaining": 0}));
    validate_fails("countdown.schema.json", &json!({"now": 1, "op": "ENTRY_COUNTDOWN", "remaining": -1}));
}

// ---------------------------------------------------------------------------
// CMD_ACK
// ---------------------------------------------------------------------------

#[test]
fn cmd_ack_success_with_src() {
    validate(
        "cmd_ack.schema.json",
        &json!({"now": 1, "op": "CMD_ACK", "success": true, "src": {"op": "ARM_FULL"}}),
    );
}

#[test]
fn cmd_ack_failure_with_error() {
    validate(
        "cmd_ack.schema.json",
        &json!({
            "now": 1,
            "op": "CMD_ACK",
            "success": false,
            "src": {"op": "SET_MODE", "mode": "party"},
            "error": "Invalid mode: party"
        }),
    );
}

#[test]
fn cmd_ack_extra_field_rejected() {
    validate_fails(
        "cmd_ack.schema.json",
        &json!({"now": 1, "op": "CMD_ACK", "success": true, "partition": 1}),
    );
}
