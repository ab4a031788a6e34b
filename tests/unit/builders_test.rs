//! Tests for builder modules

use ticket_lot::builders::SchedulerBuilder;
use ticket_lot::config::{PolicyKind, SchedulerConfig};
use ticket_lot::core::{TicketError, DEFAULT_SCHEDULER_NAME};

#[test]
fn test_scheduler_builder_defaults() {
    let builder = SchedulerBuilder::new(["arm", "claw"]);
    assert_eq!(builder.name(), DEFAULT_SCHEDULER_NAME);
    assert!(builder.audit_trail().is_none());

    let scheduler = builder.build().unwrap();
    assert_eq!(scheduler.available_keys().len(), 2);
    assert!(!scheduler.is_stopped());
}

#[test]
fn test_scheduler_builder_rejects_empty_keys() {
    let err = SchedulerBuilder::<&str>::new([]).build().unwrap_err();
    assert_eq!(err, TicketError::EmptyKeys);
}

#[test]
fn test_scheduler_builder_rejects_zero_buffer() {
    let err = SchedulerBuilder::new([1u8])
        .with_completion_buffer(0)
        .build()
        .unwrap_err();
    assert!(matches!(err, TicketError::Config(_)));
}

#[test]
fn test_scheduler_builder_from_config() {
    let cfg = SchedulerConfig {
        name: "wrist".to_string(),
        policy: PolicyKind::Standby,
        completion_buffer: 16,
        audit_capacity: Some(32),
    };
    let builder = SchedulerBuilder::from_config(&cfg, ['x', 'y']).unwrap();
    assert_eq!(builder.name(), "wrist");
    assert!(builder.audit_trail().is_some_and(|trail| trail.is_empty()));
    assert_eq!(builder.build().unwrap().name(), "wrist");
}

#[test]
fn test_scheduler_builder_from_invalid_config() {
    let cfg = SchedulerConfig {
        completion_buffer: 0,
        ..SchedulerConfig::default()
    };
    let err = SchedulerBuilder::from_config(&cfg, ['x']).err().unwrap();
    assert!(matches!(err, TicketError::Config(_)));
}
