//! Tests for error types

use ticket_lot::core::{AppResult, TicketError};

#[test]
fn test_no_scheduler_error() {
    let err = TicketError::NoScheduler;
    assert_eq!(format!("{}", err), "no ticket scheduler bound to this context");
}

#[test]
fn test_unknown_keys_error() {
    let err = TicketError::UnknownKeys {
        missing: "{Camera}".to_string(),
    };
    assert_eq!(format!("{}", err), "keys {Camera} not available to this scheduler");
}

#[test]
fn test_cancelled_error() {
    assert_eq!(format!("{}", TicketError::Cancelled), "ticket cancelled by scheduler");
}

#[test]
fn test_policy_violation_error() {
    let err = TicketError::PolicyViolation("bad pick".to_string());
    assert_eq!(format!("{}", err), "scheduling policy violation: bad pick");
}

#[test]
fn test_error_converts_into_app_result() {
    fn fails() -> AppResult<()> {
        let outcome: Result<(), TicketError> = Err(TicketError::Stopped);
        outcome?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert_eq!(err.to_string(), "scheduler stopped");
    assert_eq!(err.downcast_ref::<TicketError>(), Some(&TicketError::Stopped));
}
