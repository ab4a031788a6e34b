//! Tests for audit sink

use ticket_lot::core::{build_audit_event, AuditSink, InMemoryAuditSink, Ticket, Transition};

fn ticket_id() -> ticket_lot::core::TicketId {
    Ticket::from_fn(['k'], |_ctx| async {}).unwrap().id()
}

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);
    let id = ticket_id();

    sink.record(build_audit_event(id, Transition::Queued));
    sink.record(build_audit_event(id, Transition::Activated));
    assert_eq!(sink.len(), 2);

    let events = sink.events();
    assert_eq!(events[0].ticket, id);
    assert_eq!(events[0].transition, Transition::Queued);
    assert!(events[0].created_at_ms <= events[1].created_at_ms);
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);
    let id = ticket_id();

    sink.record(build_audit_event(id, Transition::Standby));
    sink.record(build_audit_event(id, Transition::Promoted));
    sink.record(build_audit_event(id, Transition::Activated));

    assert_eq!(
        sink.transitions_of(id),
        vec![Transition::Promoted, Transition::Activated]
    );
}

#[test]
fn test_audit_sink_clones_share_buffer() {
    let sink = InMemoryAuditSink::new(4);
    let mut writer = sink.clone();
    let (first, second) = (ticket_id(), ticket_id());

    writer.record(build_audit_event(first, Transition::Dropped));
    writer.record(build_audit_event(second, Transition::Finished { cancelled: true }));

    assert_eq!(sink.transitions_of(first), vec![Transition::Dropped]);
    assert_eq!(
        sink.transitions_of(second),
        vec![Transition::Finished { cancelled: true }]
    );
}

#[test]
fn test_zero_capacity_sink_keeps_nothing() {
    let mut sink = InMemoryAuditSink::new(0);
    sink.record(build_audit_event(ticket_id(), Transition::Queued));
    assert!(sink.is_empty());
}

#[test]
fn test_transition_serializes_with_kind_tag() {
    let json = serde_json::to_value(Transition::Finished { cancelled: false }).unwrap();
    assert_eq!(json, serde_json::json!({"kind": "finished", "cancelled": false}));
}
