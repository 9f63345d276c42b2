use super::types::{AlarmConfig, DEFAULT_QUANTUM_MS};
use crate::clock::ClockClass;

#[test]
fn parse_minimal_toml() {
    let cfg = AlarmConfig::from_toml("").unwrap();
    assert_eq!(cfg.scheduler.quantum_ms, DEFAULT_QUANTUM_MS);
    assert_eq!(cfg.scheduler.late_alarm_threshold_ms, 10_000);
    assert_eq!(cfg.scheduler.top_filters, 10);
    assert!(cfg.alarms.is_empty());
}

#[test]
fn parse_full_toml() {
    let toml = r#"
[scheduler]
quantum_ms = 60000
late_alarm_threshold_ms = 5000
fire_count_cap = 100
top_filters = 5
problem_log_capacity = 16

[[alarms]]
principal = "com.example.sync"
uid = 10042
action = "com.example.SYNC"
component = "com.example/.SyncReceiver"
class = "elapsed_wakeup"
delay_ms = 5000
interval_ms = 900000
inexact = true

[[alarms]]
principal = "com.example.clock"
class = "rtc"
delay_ms = 1000
"#;
    let cfg = AlarmConfig::from_toml(toml).unwrap();
    assert_eq!(cfg.scheduler.quantum_ms, 60_000);
    assert_eq!(cfg.scheduler.fire_count_cap, Some(100));
    assert_eq!(cfg.scheduler.top_filters, 5);
    assert_eq!(cfg.scheduler.problem_log_capacity, 16);
    assert_eq!(cfg.alarms.len(), 2);

    let sync = &cfg.alarms[0];
    assert_eq!(sync.class, ClockClass::ElapsedWakeup);
    assert!(sync.inexact);
    assert_eq!(sync.target().filter_key().action.as_deref(), Some("com.example.SYNC"));

    let clock = &cfg.alarms[1];
    assert_eq!(clock.uid, 10_000); // default
    assert_eq!(clock.interval_ms, 0);
    assert!(!clock.inexact);
}

#[test]
fn seed_request_is_relative_to_now() {
    let toml = r#"
[[alarms]]
principal = "com.example"
class = "elapsed"
delay_ms = 250
interval_ms = 1000
"#;
    let cfg = AlarmConfig::from_toml(toml).unwrap();
    let req = cfg.alarms[0].request(10_000);
    assert_eq!(req.trigger_at, 10_250);
    assert_eq!(req.repeat_interval, 1_000);
    assert_eq!(req.class, ClockClass::Elapsed);
}

#[test]
fn reject_non_positive_quantum() {
    let err = AlarmConfig::from_toml("[scheduler]\nquantum_ms = 0\n").unwrap_err();
    assert!(err.to_string().contains("quantum_ms"), "got: {err}");
}

#[test]
fn reject_zero_fire_count_cap() {
    let err = AlarmConfig::from_toml("[scheduler]\nfire_count_cap = 0\n").unwrap_err();
    assert!(err.to_string().contains("fire_count_cap"), "got: {err}");
}

#[test]
fn reject_zero_top_filters() {
    let err = AlarmConfig::from_toml("[scheduler]\ntop_filters = 0\n").unwrap_err();
    assert!(err.to_string().contains("top_filters"));
}

#[test]
fn reject_empty_principal() {
    let toml = r#"
[[alarms]]
principal = ""
class = "rtc"
"#;
    let err = AlarmConfig::from_toml(toml).unwrap_err();
    assert!(err.to_string().contains("empty principal"));
}

#[test]
fn reject_inexact_without_interval() {
    let toml = r#"
[[alarms]]
principal = "com.example"
class = "rtc_wakeup"
inexact = true
"#;
    let err = AlarmConfig::from_toml(toml).unwrap_err();
    assert!(err.to_string().contains("inexact"));
}

#[test]
fn reject_negative_interval() {
    let toml = r#"
[[alarms]]
principal = "com.example"
class = "rtc"
interval_ms = -1
"#;
    let err = AlarmConfig::from_toml(toml).unwrap_err();
    assert!(err.to_string().contains("negative"));
}

#[test]
fn reject_unknown_class() {
    let toml = r#"
[[alarms]]
principal = "com.example"
class = "boottime"
"#;
    assert!(AlarmConfig::from_toml(toml).is_err());
}

#[test]
fn env_override_delivery_latency() {
    std::env::set_var("ALARMD_DELIVERY_SIMULATED_LATENCY_MS", "5");
    let cfg = AlarmConfig::from_toml("").unwrap();
    assert_eq!(cfg.delivery.simulated_latency_ms, 5);
    std::env::remove_var("ALARMD_DELIVERY_SIMULATED_LATENCY_MS");
}

#[test]
fn local_config_defaults() {
    let cfg = AlarmConfig::local();
    assert_eq!(cfg.scheduler.quantum_ms, DEFAULT_QUANTUM_MS);
    assert_eq!(cfg.scheduler.fire_count_cap, None);
    assert!(cfg.alarms.is_empty());
    assert!(cfg.validate().is_ok());
}

#[test]
fn summary_has_sections() {
    let summary = AlarmConfig::local().summary();
    assert_eq!(summary["scheduler"]["quantum_ms"], DEFAULT_QUANTUM_MS);
    assert_eq!(summary["seeded_alarms"], 0);
}
