//! Error types for ticket scheduling.

use thiserror::Error;

/// Errors produced by schedulers, tickets, and execution contexts.
///
/// Losing contention is not a failure of the scheduler; it shows up as
/// [`TicketError::Cancelled`] only at the ambient API where the caller is
/// expected to unwind with `?`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TicketError {
    /// No scheduler is bound to the context a ticket was run from.
    #[error("no ticket scheduler bound to this context")]
    NoScheduler,
    /// A ticket asked for keys the scheduler does not manage.
    #[error("keys {missing} not available to this scheduler")]
    UnknownKeys {
        /// Debug rendering of the offending keys.
        missing: String,
    },
    /// A ticket or scheduler was given an empty key set.
    #[error("key set must not be empty")]
    EmptyKeys,
    /// The ticket was cancelled by the scheduler or by its enclosing region.
    #[error("ticket cancelled by scheduler")]
    Cancelled,
    /// The scheduler's run loop is not running.
    #[error("scheduler stopped")]
    Stopped,
    /// `run` was called on a scheduler whose loop was already started.
    #[error("scheduler already running")]
    AlreadyRunning,
    /// A scheduling policy returned an impossible decision.
    #[error("scheduling policy violation: {0}")]
    PolicyViolation(String),
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Unexpected runtime failure (a panicked task, a lost result).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
