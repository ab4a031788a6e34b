//! Tests for configuration validation

use ticket_lot::config::{PolicyKind, SchedulerConfig};

#[test]
fn test_scheduler_config_defaults_are_valid() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.policy, PolicyKind::Preempt);
    assert_eq!(cfg.audit_capacity, None);
}

#[test]
fn test_scheduler_config_invalid_name() {
    let invalid = SchedulerConfig {
        name: "  ".to_string(),
        ..SchedulerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_buffer() {
    let invalid = SchedulerConfig {
        completion_buffer: 0,
        ..SchedulerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_audit_capacity() {
    let invalid = SchedulerConfig {
        audit_capacity: Some(0),
        ..SchedulerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_from_json() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{"name": "arm", "policy": "priority", "audit_capacity": 128}"#,
    )
    .unwrap();
    assert_eq!(cfg.name, "arm");
    assert_eq!(cfg.policy, PolicyKind::Priority);
    assert_eq!(cfg.audit_capacity, Some(128));
    assert_eq!(cfg.completion_buffer, SchedulerConfig::default().completion_buffer);
}

#[test]
fn test_scheduler_config_from_json_rejects_invalid() {
    assert!(SchedulerConfig::from_json_str(r#"{"policy": "fastest"}"#).is_err());
    assert!(SchedulerConfig::from_json_str(r#"{"completion_buffer": 0}"#).is_err());
}

#[test]
fn test_scheduler_config_json_round_trip() {
    let cfg = SchedulerConfig {
        name: "gripper".to_string(),
        policy: PolicyKind::Demote,
        completion_buffer: 8,
        audit_capacity: None,
    };
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(SchedulerConfig::from_json_str(&json).unwrap(), cfg);
}
