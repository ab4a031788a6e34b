//! Builder for [`Scheduler`].

use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::core::{
    AuditSink, InMemoryAuditSink, KeySet, PreemptPolicy, ResourceKey, Scheduler, SharedPolicy,
    TicketError,
    DEFAULT_COMPLETION_BUFFER, DEFAULT_SCHEDULER_NAME,
};

/// Step-by-step scheduler construction.
///
/// ```
/// use std::sync::Arc;
/// use ticket_lot::builders::SchedulerBuilder;
/// use ticket_lot::core::StandbyPolicy;
///
/// let scheduler = SchedulerBuilder::new(["lift", "claw"])
///     .with_name("manipulator")
///     .with_policy(Arc::new(StandbyPolicy))
///     .build()
///     .unwrap();
/// assert_eq!(scheduler.name(), "manipulator");
/// ```
pub struct SchedulerBuilder<K: ResourceKey> {
    name: String,
    available: KeySet<K>,
    policy: SharedPolicy<K>,
    audit: Option<Box<dyn AuditSink>>,
    memory_audit: Option<InMemoryAuditSink>,
    completion_buffer: usize,
}

impl<K: ResourceKey> SchedulerBuilder<K> {
    /// Start from the keys the scheduler will manage.
    pub fn new(available: impl IntoIterator<Item = K>) -> Self {
        Self {
            name: DEFAULT_SCHEDULER_NAME.to_string(),
            available: available.into_iter().collect(),
            policy: Arc::new(PreemptPolicy),
            audit: None,
            memory_audit: None,
            completion_buffer: DEFAULT_COMPLETION_BUFFER,
        }
    }

    /// Start from configuration.
    ///
    /// # Errors
    ///
    /// [`TicketError::Config`] when `cfg` fails validation.
    pub fn from_config(
        cfg: &SchedulerConfig,
        available: impl IntoIterator<Item = K>,
    ) -> Result<Self, TicketError> {
        cfg.validate().map_err(TicketError::Config)?;

        let mut builder = Self::new(available)
            .with_name(cfg.name.clone())
            .with_policy(cfg.policy.build())
            .with_completion_buffer(cfg.completion_buffer);
        if let Some(capacity) = cfg.audit_capacity {
            let sink = InMemoryAuditSink::new(capacity);
            builder.memory_audit = Some(sink.clone());
            builder.audit = Some(Box::new(sink));
        }
        Ok(builder)
    }

    /// Name used in tracing spans.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Admission policy.
    #[must_use]
    pub fn with_policy(mut self, policy: SharedPolicy<K>) -> Self {
        self.policy = policy;
        self
    }

    /// Attach an audit sink receiving every state transition.
    #[must_use]
    pub fn with_audit(mut self, sink: impl AuditSink + 'static) -> Self {
        self.audit = Some(Box::new(sink));
        self.memory_audit = None;
        self
    }

    /// Capacity of the completion broadcast.
    #[must_use]
    pub fn with_completion_buffer(mut self, capacity: usize) -> Self {
        self.completion_buffer = capacity;
        self
    }

    /// The in-memory audit trail created by [`SchedulerBuilder::from_config`],
    /// if the configuration asked for one.
    #[must_use]
    pub const fn audit_trail(&self) -> Option<&InMemoryAuditSink> {
        self.memory_audit.as_ref()
    }

    /// Name the scheduler will carry.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build the scheduler. It does nothing until its run loop is driven.
    ///
    /// # Errors
    ///
    /// [`TicketError::EmptyKeys`] when no keys were given,
    /// [`TicketError::Config`] for a zero completion buffer.
    pub fn build(self) -> Result<Scheduler<K>, TicketError> {
        if self.completion_buffer == 0 {
            return Err(TicketError::Config("completion_buffer must be greater than 0".into()));
        }
        Scheduler::assemble(
            self.name,
            self.available,
            self.policy,
            self.audit,
            self.completion_buffer,
        )
    }
}
