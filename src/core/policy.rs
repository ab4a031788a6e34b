//! Scheduling policies: admission of new tickets and tie-breaks among
//! promotable standby tickets.
//!
//! Policies are called from inside the scheduler's run loop and only ever see
//! snapshots. They must be quick, must not block, and must not panic under
//! normal operation: a panicking policy takes the run loop down with it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::key::ResourceKey;
use crate::core::{Scheduler, Ticket};

/// Decision for a newly submitted ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Admission {
    /// Refuse the ticket; its submitters see a cancelled outcome.
    Drop,
    /// Park the ticket until the promotion pass picks it.
    Standby,
    /// Admit the ticket. Conflicting queued tickets are cancelled when
    /// `drop_existing` is set and moved back to standby otherwise.
    /// Conflicting active tickets are asked to cancel either way.
    Queue {
        /// Cancel (rather than demote) conflicting queued tickets.
        drop_existing: bool,
    },
}

/// Read-only view of the scheduler's three collections.
#[derive(Debug)]
pub struct SchedulerView<'a, K: ResourceKey> {
    /// Running tickets.
    pub active: &'a [Ticket<K>],
    /// Admitted tickets waiting for their keys.
    pub queued: &'a [Ticket<K>],
    /// Parked tickets, oldest first.
    pub standby: &'a [Ticket<K>],
}

impl<'a, K: ResourceKey> SchedulerView<'a, K> {
    /// Active and queued tickets that conflict with `ticket`.
    pub fn contenders<'t>(&self, ticket: &'t Ticket<K>) -> impl Iterator<Item = &'a Ticket<K>> + 't
    where
        'a: 't,
    {
        self.active
            .iter()
            .chain(self.queued.iter())
            .filter(move |other| other.conflicts_with(ticket))
    }
}

/// Non-empty list of standby tickets whose keys are currently free, in
/// arrival order (oldest first).
pub struct Candidates<'a, K: ResourceKey> {
    oldest: &'a Ticket<K>,
    newest: &'a Ticket<K>,
    all: &'a [Ticket<K>],
}

impl<'a, K: ResourceKey> Candidates<'a, K> {
    pub(crate) fn new(all: &'a [Ticket<K>]) -> Option<Self> {
        let oldest = all.first()?;
        let newest = all.last()?;
        Some(Self { oldest, newest, all })
    }

    /// Earliest arrival.
    #[must_use]
    pub const fn oldest(&self) -> &'a Ticket<K> {
        self.oldest
    }

    /// Latest arrival.
    #[must_use]
    pub const fn newest(&self) -> &'a Ticket<K> {
        self.newest
    }

    /// Iterate in arrival order.
    pub fn iter(&self) -> std::slice::Iter<'a, Ticket<K>> {
        self.all.iter()
    }

    /// Number of candidates, never zero.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.all.len()
    }

    /// The candidates as a slice.
    #[must_use]
    pub const fn as_slice(&self) -> &'a [Ticket<K>] {
        self.all
    }
}

/// Pluggable admission and selection logic.
pub trait SchedulingPolicy<K: ResourceKey>: Send + Sync {
    /// Decide what happens to a ticket that is not yet known to the scheduler.
    fn classify(&self, ticket: &Ticket<K>, view: &SchedulerView<'_, K>) -> Admission;

    /// Pick one standby ticket to promote. Must return one of `candidates`.
    fn select<'a>(&self, candidates: Candidates<'a, K>) -> &'a Ticket<K>;
}

/// Shared, swappable policy handle.
pub type SharedPolicy<K> = Arc<dyn SchedulingPolicy<K>>;

/// Default policy: newest ticket wins. Always queues, cancelling conflicting
/// queued tickets and preempting conflicting active ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreemptPolicy;

impl<K: ResourceKey> SchedulingPolicy<K> for PreemptPolicy {
    fn classify(&self, _ticket: &Ticket<K>, _view: &SchedulerView<'_, K>) -> Admission {
        Admission::Queue { drop_existing: true }
    }

    fn select<'a>(&self, candidates: Candidates<'a, K>) -> &'a Ticket<K> {
        candidates.newest()
    }
}

/// Like [`PreemptPolicy`] but conflicting queued tickets go back to standby
/// instead of being cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemotePolicy;

impl<K: ResourceKey> SchedulingPolicy<K> for DemotePolicy {
    fn classify(&self, _ticket: &Ticket<K>, _view: &SchedulerView<'_, K>) -> Admission {
        Admission::Queue { drop_existing: false }
    }

    fn select<'a>(&self, candidates: Candidates<'a, K>) -> &'a Ticket<K> {
        candidates.newest()
    }
}

/// Never preempts: every ticket waits in standby and runs once its keys are
/// free, oldest first.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandbyPolicy;

impl<K: ResourceKey> SchedulingPolicy<K> for StandbyPolicy {
    fn classify(&self, _ticket: &Ticket<K>, _view: &SchedulerView<'_, K>) -> Admission {
        Admission::Standby
    }

    fn select<'a>(&self, candidates: Candidates<'a, K>) -> &'a Ticket<K> {
        candidates.oldest()
    }
}

/// Priority tag understood by [`PriorityPolicy`]. Untagged tickets count as
/// [`Priority::Normal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background work.
    Low,
    /// Regular routines.
    #[default]
    Normal,
    /// Operator commands.
    High,
    /// Safety stops.
    Critical,
}

impl Priority {
    /// Priority of a ticket, defaulting to `Normal`.
    pub fn of<K: ResourceKey>(ticket: &Ticket<K>) -> Self {
        ticket.priority::<Self>().copied().unwrap_or_default()
    }
}

/// Preempts only tickets of equal or lower [`Priority`]; anything else waits
/// in standby. Promotion picks the highest priority, newest first on ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityPolicy;

impl<K: ResourceKey> SchedulingPolicy<K> for PriorityPolicy {
    fn classify(&self, ticket: &Ticket<K>, view: &SchedulerView<'_, K>) -> Admission {
        let priority = Priority::of(ticket);
        if view.contenders(ticket).all(|other| Priority::of(other) <= priority) {
            Admission::Queue { drop_existing: true }
        } else {
            Admission::Standby
        }
    }

    fn select<'a>(&self, candidates: Candidates<'a, K>) -> &'a Ticket<K> {
        candidates
            .iter()
            .enumerate()
            .max_by_key(|&(arrival, ticket)| (Priority::of(ticket), arrival))
            .map_or_else(|| candidates.newest(), |(_, ticket)| ticket)
    }
}

/// Forwards every decision to whatever policy a parent scheduler has
/// configured at the time of the call.
///
/// Nested schedulers opened by `with_ticket` use this so the whole tree of
/// schedulers follows the outermost admission rules, including later
/// [`Scheduler::set_policy`] changes.
pub struct DelegatingPolicy<K: ResourceKey> {
    parent: Scheduler<K>,
}

impl<K: ResourceKey> DelegatingPolicy<K> {
    /// Delegate to `parent`.
    #[must_use]
    pub const fn new(parent: Scheduler<K>) -> Self {
        Self { parent }
    }
}

impl<K: ResourceKey> SchedulingPolicy<K> for DelegatingPolicy<K> {
    fn classify(&self, ticket: &Ticket<K>, view: &SchedulerView<'_, K>) -> Admission {
        self.parent.policy().classify(ticket, view)
    }

    fn select<'a>(&self, candidates: Candidates<'a, K>) -> &'a Ticket<K> {
        self.parent.policy().select(candidates)
    }
}
