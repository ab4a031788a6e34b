//! Core scheduling abstractions: keys, tickets, policies, and the scheduler.

pub mod audit;
pub mod error;
pub mod key;
pub mod policy;
pub mod scheduler;
pub mod ticket;

pub use audit::{build_audit_event, AuditEvent, AuditSink, InMemoryAuditSink, Transition};
pub use error::{AppResult, TicketError};
pub use key::{KeySet, ResourceKey};
pub use policy::{
    Admission, Candidates, DelegatingPolicy, DemotePolicy, PreemptPolicy, Priority, PriorityPolicy,
    SchedulerView, SchedulingPolicy, SharedPolicy, StandbyPolicy,
};
pub use scheduler::{
    Completion, Scheduler, SchedulerSnapshot, DEFAULT_COMPLETION_BUFFER, DEFAULT_SCHEDULER_NAME,
};
pub use ticket::{Outcome, Ticket, TicketAction, TicketBuilder, TicketId};
