//! The ticket scheduler.
//!
//! One run loop owns the three ticket collections (standby, queued, active)
//! and is their only writer. Everything else talks to it through a single
//! ordered message stream:
//!
//! - `Queue`: a submitter hands over a ticket plus a reply slot
//! - `Finish`: the watcher of a launched action reports that it ended
//! - `Snapshot`: read-only introspection
//!
//! After each message the loop runs a promotion pass (standby → queued) and an
//! activation pass (queued → active). Launching an action never blocks the
//! loop; completion comes back as another `Finish` message.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, info, info_span, trace, warn, Instrument};

use crate::core::audit::{build_audit_event, AuditSink, Transition};
use crate::core::key::{describe_missing, KeySet, ResourceKey};
use crate::core::policy::{Admission, Candidates, PreemptPolicy, SchedulerView, SharedPolicy};
use crate::core::{Outcome, Ticket, TicketError, TicketId};
use crate::runtime::TicketContext;

/// Default capacity of the completion broadcast.
pub const DEFAULT_COMPLETION_BUFFER: usize = 256;

/// Default scheduler name used in tracing spans.
pub const DEFAULT_SCHEDULER_NAME: &str = "tickets";

/// Published once for every ticket that leaves the scheduler: after its
/// action ended, or when it was dropped or evicted without running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Ticket identity.
    pub ticket: TicketId,
    /// Whether it ended cancelled.
    pub cancelled: bool,
}

impl Completion {
    /// Outcome seen by the ticket's submitters.
    #[must_use]
    pub const fn outcome(&self) -> Outcome {
        Outcome::from_cancelled(self.cancelled)
    }
}

/// Point-in-time view of the run loop's state and counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    /// Standby tickets, oldest first.
    pub standby: Vec<TicketId>,
    /// Queued tickets in admission order.
    pub queued: Vec<TicketId>,
    /// Running tickets, unordered.
    pub active: Vec<TicketId>,
    /// Submissions received, duplicates included.
    pub submitted: u64,
    /// Actions launched.
    pub started: u64,
    /// Tickets that finished without cancellation.
    pub completed: u64,
    /// Tickets dropped, evicted, or finished cancelled.
    pub cancelled: u64,
}

enum Message<K: ResourceKey> {
    Queue {
        ticket: Ticket<K>,
        reply: oneshot::Sender<Outcome>,
    },
    Finish {
        ticket: TicketId,
        cancelled: bool,
    },
    Snapshot {
        reply: oneshot::Sender<SchedulerSnapshot>,
    },
}

struct Shared<K: ResourceKey> {
    name: String,
    available: KeySet<K>,
    policy: RwLock<SharedPolicy<K>>,
    tx: mpsc::UnboundedSender<Message<K>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Message<K>>>>,
    audit: Mutex<Option<Box<dyn AuditSink>>>,
    completions: broadcast::Sender<Completion>,
    stop: CancellationToken,
    region: Mutex<Option<CancellationToken>>,
}

/// Handle to a ticket scheduler. Cheap to clone; all clones drive the same
/// run loop.
///
/// ```rust,ignore
/// let scheduler = Scheduler::new([Arm, Gripper, Camera])?;
/// tokio::spawn({
///     let scheduler = scheduler.clone();
///     async move { scheduler.run(TicketContext::root()).await }
/// });
///
/// let grab = Ticket::from_fn([Arm, Gripper], |ctx| async move {
///     ctx.run_until_cancelled(close_gripper()).await;
/// })?;
/// assert_eq!(scheduler.submit(&grab).await?, Outcome::Completed);
/// scheduler.stop();
/// ```
pub struct Scheduler<K: ResourceKey> {
    shared: Arc<Shared<K>>,
}

impl<K: ResourceKey> Scheduler<K> {
    /// Scheduler over `available` keys with the default [`PreemptPolicy`].
    ///
    /// # Errors
    ///
    /// [`TicketError::EmptyKeys`] when `available` is empty.
    pub fn new(available: impl IntoIterator<Item = K>) -> Result<Self, TicketError> {
        Self::with_policy(available, Arc::new(PreemptPolicy))
    }

    /// Scheduler over `available` keys with an explicit policy.
    ///
    /// # Errors
    ///
    /// [`TicketError::EmptyKeys`] when `available` is empty.
    pub fn with_policy(
        available: impl IntoIterator<Item = K>,
        policy: SharedPolicy<K>,
    ) -> Result<Self, TicketError> {
        Self::assemble(
            DEFAULT_SCHEDULER_NAME.to_string(),
            available.into_iter().collect(),
            policy,
            None,
            DEFAULT_COMPLETION_BUFFER,
        )
    }

    pub(crate) fn assemble(
        name: String,
        available: KeySet<K>,
        policy: SharedPolicy<K>,
        audit: Option<Box<dyn AuditSink>>,
        completion_buffer: usize,
    ) -> Result<Self, TicketError> {
        if available.is_empty() {
            return Err(TicketError::EmptyKeys);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let (completions, _) = broadcast::channel(completion_buffer.max(1));
        Ok(Self {
            shared: Arc::new(Shared {
                name,
                available,
                policy: RwLock::new(policy),
                tx,
                rx: Mutex::new(Some(rx)),
                audit: Mutex::new(audit),
                completions,
                stop: CancellationToken::new(),
                region: Mutex::new(None),
            }),
        })
    }

    /// Name used in tracing spans.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The keys this scheduler manages.
    #[must_use]
    pub fn available_keys(&self) -> &KeySet<K> {
        &self.shared.available
    }

    /// The policy currently in force.
    #[must_use]
    pub fn policy(&self) -> SharedPolicy<K> {
        Arc::clone(&self.shared.policy.read())
    }

    /// Replace the policy. Takes effect from the next decision, including
    /// decisions of nested schedulers delegating to this one.
    pub fn set_policy(&self, policy: SharedPolicy<K>) {
        *self.shared.policy.write() = policy;
    }

    /// Subscribe to every completion processed from now on.
    #[must_use]
    pub fn completions(&self) -> broadcast::Receiver<Completion> {
        self.shared.completions.subscribe()
    }

    /// Ask the run loop to halt. Idempotent. Running actions are left alone;
    /// their lifetime belongs to the enclosing region.
    pub fn stop(&self) {
        self.shared.stop.cancel();
    }

    /// True once [`Scheduler::stop`] was called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.stop.is_cancelled()
    }

    /// Error for a caller whose reply can no longer arrive: the ticket lost
    /// to its region's cancellation, or the loop was stopped.
    fn closed_error(&self) -> TicketError {
        let region_cancelled = self
            .shared
            .region
            .lock()
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled);
        if region_cancelled {
            TicketError::Cancelled
        } else {
            TicketError::Stopped
        }
    }

    /// Submit a ticket and wait for it to finish.
    ///
    /// Submitting the same ticket concurrently from several callers runs its
    /// action once; every caller gets the same outcome.
    ///
    /// # Errors
    ///
    /// - [`TicketError::UnknownKeys`] if the ticket needs keys outside
    ///   [`Scheduler::available_keys`]; nothing is submitted.
    /// - [`TicketError::Cancelled`] if the region driving the run loop was
    ///   cancelled before the ticket finished.
    /// - [`TicketError::Stopped`] if the run loop is stopped before the
    ///   ticket finishes.
    pub async fn submit(&self, ticket: &Ticket<K>) -> Result<Outcome, TicketError> {
        if !ticket.requirements().is_subset(&self.shared.available) {
            return Err(TicketError::UnknownKeys {
                missing: describe_missing(ticket.requirements(), &self.shared.available),
            });
        }
        if self.is_stopped() {
            return Err(self.closed_error());
        }

        let (reply, outcome) = oneshot::channel();
        self.shared
            .tx
            .send(Message::Queue {
                ticket: ticket.clone(),
                reply,
            })
            .map_err(|_| self.closed_error())?;
        outcome.await.map_err(|_| self.closed_error())
    }

    /// Capture the run loop's current state.
    ///
    /// # Errors
    ///
    /// [`TicketError::Stopped`] if the run loop is not running.
    pub async fn snapshot(&self) -> Result<SchedulerSnapshot, TicketError> {
        if self.is_stopped() {
            return Err(TicketError::Stopped);
        }
        let (reply, snapshot) = oneshot::channel();
        self.shared
            .tx
            .send(Message::Snapshot { reply })
            .map_err(|_| TicketError::Stopped)?;
        snapshot.await.map_err(|_| TicketError::Stopped)
    }

    /// Drive the state machine until [`Scheduler::stop`] is called or `ctx`
    /// is cancelled.
    ///
    /// Actions are spawned on `ctx`'s task tracker with child tokens of
    /// `ctx`'s token, and see `ctx`'s bound scheduler (if any).
    ///
    /// # Errors
    ///
    /// - [`TicketError::AlreadyRunning`] if called more than once.
    /// - [`TicketError::PolicyViolation`] if the policy's `select` returns a
    ///   ticket outside the candidate set; the loop stops.
    pub async fn run(&self, ctx: TicketContext<K>) -> Result<(), TicketError> {
        let rx = self
            .shared
            .rx
            .lock()
            .take()
            .ok_or(TicketError::AlreadyRunning)?;
        let audit = self.shared.audit.lock().take();
        *self.shared.region.lock() = Some(ctx.token().clone());
        let span = info_span!("ticket_scheduler", name = %self.shared.name);
        RunLoop::new(self.clone(), ctx, audit)
            .drive(rx)
            .instrument(span)
            .await
    }
}

impl<K: ResourceKey> Clone for Scheduler<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: ResourceKey> fmt::Debug for Scheduler<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.shared.name)
            .field("available", &self.shared.available)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

struct ActiveTicket<K: ResourceKey> {
    ticket: Ticket<K>,
    token: CancellationToken,
}

#[derive(Default)]
struct Counters {
    submitted: u64,
    started: u64,
    completed: u64,
    cancelled: u64,
}

/// State owned by the run loop. Nothing outside this struct touches it.
struct RunLoop<K: ResourceKey> {
    scheduler: Scheduler<K>,
    ctx: TicketContext<K>,
    audit: Option<Box<dyn AuditSink>>,
    standby: Vec<Ticket<K>>,
    queued: Vec<Ticket<K>>,
    active: HashMap<TicketId, ActiveTicket<K>>,
    waiters: HashMap<TicketId, Vec<oneshot::Sender<Outcome>>>,
    counters: Counters,
}

impl<K: ResourceKey> RunLoop<K> {
    fn new(
        scheduler: Scheduler<K>,
        ctx: TicketContext<K>,
        audit: Option<Box<dyn AuditSink>>,
    ) -> Self {
        Self {
            scheduler,
            ctx,
            audit,
            standby: Vec::new(),
            queued: Vec::new(),
            active: HashMap::new(),
            waiters: HashMap::new(),
            counters: Counters::default(),
        }
    }

    async fn drive(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Message<K>>,
    ) -> Result<(), TicketError> {
        let stop = self.scheduler.shared.stop.clone();
        let region = self.ctx.token().clone();
        info!(keys = self.scheduler.shared.available.len(), "scheduler started");

        loop {
            let message = tokio::select! {
                biased;
                () = stop.cancelled() => break,
                () = region.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.handle(message)?;
        }

        if region.is_cancelled() {
            self.abandon();
        }

        info!(
            standby = self.standby.len(),
            queued = self.queued.len(),
            active = self.active.len(),
            "scheduler stopped"
        );
        Ok(())
    }

    fn handle(&mut self, message: Message<K>) -> Result<(), TicketError> {
        match message {
            Message::Queue { ticket, reply } => self.admit(ticket, reply),
            Message::Finish { ticket, cancelled } => self.finish(ticket, cancelled),
            Message::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
                return Ok(());
            }
        }
        self.promote()?;
        self.activate();
        Ok(())
    }

    fn admit(&mut self, ticket: Ticket<K>, reply: oneshot::Sender<Outcome>) {
        let id = ticket.id();
        self.counters.submitted += 1;
        self.waiters.entry(id).or_default().push(reply);

        if self.is_resident(id) {
            trace!(ticket = %id, "duplicate submission joined");
            return;
        }

        let active: Vec<Ticket<K>> = self
            .active
            .values()
            .map(|entry| entry.ticket.clone())
            .collect();
        let admission = self.scheduler.policy().classify(
            &ticket,
            &SchedulerView {
                active: &active,
                queued: &self.queued,
                standby: &self.standby,
            },
        );

        match admission {
            Admission::Drop => {
                debug!(ticket = %id, "ticket dropped by policy");
                self.record(id, Transition::Dropped);
                self.complete(id, true);
            }
            Admission::Standby => {
                debug!(ticket = %id, "ticket parked in standby");
                self.record(id, Transition::Standby);
                self.standby.push(ticket);
            }
            Admission::Queue { drop_existing } => {
                let (evicted, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.queued)
                    .into_iter()
                    .partition(|queued| queued.conflicts_with(&ticket));
                self.queued = kept;

                for loser in evicted {
                    let loser_id = loser.id();
                    if drop_existing {
                        warn!(ticket = %loser_id, by = %id, "queued ticket evicted");
                        self.record(loser_id, Transition::Evicted);
                        self.complete(loser_id, true);
                    } else {
                        debug!(ticket = %loser_id, by = %id, "queued ticket demoted to standby");
                        self.record(loser_id, Transition::Demoted);
                        self.standby.push(loser);
                    }
                }

                let preempted: Vec<TicketId> = self
                    .active
                    .values()
                    .filter(|entry| {
                        entry.ticket.conflicts_with(&ticket) && !entry.token.is_cancelled()
                    })
                    .map(|entry| {
                        entry.token.cancel();
                        entry.ticket.id()
                    })
                    .collect();
                for victim in preempted {
                    warn!(ticket = %victim, by = %id, "preempting active ticket");
                    self.record(victim, Transition::PreemptRequested);
                }

                debug!(ticket = %id, "ticket queued");
                self.record(id, Transition::Queued);
                self.queued.push(ticket);
            }
        }
    }

    fn finish(&mut self, id: TicketId, cancelled: bool) {
        if self.active.remove(&id).is_none() {
            warn!(ticket = %id, "finish reported for a ticket that is not active");
            return;
        }
        debug!(ticket = %id, cancelled, "ticket finished");
        self.record(id, Transition::Finished { cancelled });
        self.complete(id, cancelled);
    }

    /// The region was cancelled: every ticket still waiting or running ends
    /// cancelled, and its submitters hear about it before the loop goes away.
    fn abandon(&mut self) {
        let pending: Vec<TicketId> = self.waiters.keys().copied().collect();
        for id in pending {
            debug!(ticket = %id, "ticket abandoned with its region");
            self.record(id, Transition::Abandoned);
            self.complete(id, true);
        }
        self.standby.clear();
        self.queued.clear();
        self.active.clear();
    }

    /// Move every standby ticket that fits into queued, letting the policy
    /// pick among tickets that conflict with each other.
    fn promote(&mut self) -> Result<(), TicketError> {
        if self.standby.is_empty() {
            return Ok(());
        }

        let held: KeySet<K> = self
            .active
            .values()
            .map(|entry| &entry.ticket)
            .chain(self.queued.iter())
            .flat_map(|ticket| ticket.requirements().iter().cloned())
            .collect();
        let mut candidates: Vec<Ticket<K>> = self
            .standby
            .iter()
            .filter(|ticket| !ticket.needs_any(&held))
            .cloned()
            .collect();
        let policy = self.scheduler.policy();

        while let Some(choices) = Candidates::new(&candidates) {
            let chosen = policy.select(choices).clone();
            if !candidates.contains(&chosen) {
                error!(ticket = %chosen.id(), "policy selected a ticket outside the candidate set");
                return Err(TicketError::PolicyViolation(format!(
                    "select returned ticket {} which is not a promotable standby ticket",
                    chosen.id()
                )));
            }

            self.standby.retain(|ticket| *ticket != chosen);
            candidates.retain(|ticket| !ticket.conflicts_with(&chosen));
            debug!(ticket = %chosen.id(), "ticket promoted from standby");
            self.record(chosen.id(), Transition::Promoted);
            self.queued.push(chosen);
        }
        Ok(())
    }

    /// Launch every queued ticket whose keys are free.
    fn activate(&mut self) {
        if self.queued.is_empty() {
            return;
        }

        let mut held: KeySet<K> = self
            .active
            .values()
            .flat_map(|entry| entry.ticket.requirements().iter().cloned())
            .collect();
        let mut waiting = Vec::with_capacity(self.queued.len());

        for ticket in std::mem::take(&mut self.queued) {
            if ticket.needs_any(&held) {
                waiting.push(ticket);
                continue;
            }
            held.extend(ticket.requirements().iter().cloned());
            self.launch(ticket);
        }
        self.queued = waiting;
    }

    fn launch(&mut self, ticket: Ticket<K>) {
        let id = ticket.id();
        let token = self.ctx.token().child_token();
        let action = ticket.action();
        let action_ctx = self.ctx.for_action(token.clone());
        let tracker = self.ctx.tracker();

        let watched = token.clone();
        let handle = tracker.spawn(
            async move {
                action.run(action_ctx).await;
                // Read as the action returns; later conflicts must not rewrite it.
                watched.is_cancelled()
            }
            .instrument(debug_span!("ticket", id = %id)),
        );

        let tx = self.scheduler.shared.tx.clone();
        tracker.spawn(async move {
            let cancelled = match handle.await {
                Ok(cancelled) => cancelled,
                Err(err) => {
                    if err.is_panic() {
                        error!(ticket = %id, "ticket action panicked");
                    }
                    true
                }
            };
            if tx.send(Message::Finish { ticket: id, cancelled }).is_err() {
                trace!(ticket = %id, cancelled, "finish dropped, scheduler loop already gone");
            }
        });

        self.counters.started += 1;
        debug!(ticket = %id, "ticket activated");
        self.record(id, Transition::Activated);
        self.active.insert(id, ActiveTicket { ticket, token });
    }

    fn complete(&mut self, ticket: TicketId, cancelled: bool) {
        if cancelled {
            self.counters.cancelled += 1;
        } else {
            self.counters.completed += 1;
        }

        let outcome = Outcome::from_cancelled(cancelled);
        for reply in self.waiters.remove(&ticket).unwrap_or_default() {
            let _ = reply.send(outcome);
        }
        let _ = self.scheduler.shared.completions.send(Completion { ticket, cancelled });
    }

    fn is_resident(&self, id: TicketId) -> bool {
        self.active.contains_key(&id)
            || self.queued.iter().any(|ticket| ticket.id() == id)
            || self.standby.iter().any(|ticket| ticket.id() == id)
    }

    fn record(&mut self, ticket: TicketId, transition: Transition) {
        if let Some(sink) = self.audit.as_mut() {
            sink.record(build_audit_event(ticket, transition));
        }
    }

    fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            standby: self.standby.iter().map(Ticket::id).collect(),
            queued: self.queued.iter().map(Ticket::id).collect(),
            active: self.active.keys().copied().collect(),
            submitted: self.counters.submitted,
            started: self.counters.started,
            completed: self.counters.completed,
            cancelled: self.counters.cancelled,
        }
    }
}
