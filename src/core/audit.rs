//! Audit trail of ticket state transitions.
//!
//! The run loop reports every transition to an attached [`AuditSink`]. The
//! in-memory sink keeps a bounded ring buffer and is mostly useful for tests
//! and for post-mortem dumps on a robot that just did something surprising.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::TicketId;
use crate::util::clock::now_ms;

/// A state change of one ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Transition {
    /// Refused by the policy.
    Dropped,
    /// Parked on arrival.
    Standby,
    /// Admitted on arrival.
    Queued,
    /// Moved from standby to queued by the promotion pass.
    Promoted,
    /// Pushed back from queued to standby by a conflicting arrival.
    Demoted,
    /// Cancelled while queued by a conflicting arrival.
    Evicted,
    /// Action launched; keys held.
    Activated,
    /// Asked to cancel because a conflicting ticket was admitted.
    PreemptRequested,
    /// Cancelled along with the region driving the scheduler, before the
    /// loop saw it finish.
    Abandoned,
    /// Left the active set.
    Finished {
        /// Whether the run ended cancelled.
        cancelled: bool,
    },
}

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Ticket the transition applies to.
    pub ticket: TicketId,
    /// What happened.
    pub transition: Transition,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// Bounded in-memory sink. Clones share one buffer, so a test can keep a
/// clone while the scheduler owns the other.
#[derive(Debug, Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Transitions recorded for one ticket, oldest first.
    #[must_use]
    pub fn transitions_of(&self, ticket: TicketId) -> Vec<Transition> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.ticket == ticket)
            .map(|event| event.transition)
            .collect()
    }

    /// Number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True when nothing has been recorded (or everything was evicted).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Helper to build a timestamped audit event.
#[must_use]
pub fn build_audit_event(ticket: TicketId, transition: Transition) -> AuditEvent {
    AuditEvent {
        ticket,
        transition,
        created_at_ms: now_ms(),
    }
}
