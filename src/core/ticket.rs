//! Tickets: a unit of work plus the resources it holds for its whole run.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::key::{overlaps, KeySet, ResourceKey};
use crate::core::TicketError;
use crate::runtime::TicketContext;

/// Identity of a ticket instance.
///
/// Assigned when the ticket is built and shared by every clone of the handle,
/// so resubmitting the same handle is recognised as the same ticket while an
/// identical ticket built twice is tracked twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a submitted ticket ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The action ran to completion without a cancellation request.
    Completed,
    /// The ticket was dropped, evicted, or its action was cancelled.
    Cancelled,
}

impl Outcome {
    pub(crate) const fn from_cancelled(cancelled: bool) -> Self {
        if cancelled {
            Self::Cancelled
        } else {
            Self::Completed
        }
    }

    /// True for [`Outcome::Cancelled`].
    #[must_use]
    pub const fn is_cancelled(self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// The work a ticket performs once its keys are granted.
///
/// The action may be invoked again if the same ticket is resubmitted after it
/// finished, hence `&self`. Cancellation is cooperative: the context's token
/// is cancelled when a conflicting ticket preempts this one, and the action
/// decides when to honour it.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use ticket_lot::core::TicketAction;
/// use ticket_lot::runtime::TicketContext;
///
/// struct Home;
///
/// #[async_trait]
/// impl TicketAction<Joint> for Home {
///     async fn run(&self, ctx: TicketContext<Joint>) {
///         ctx.run_until_cancelled(drive_to_limit_switch()).await;
///     }
/// }
/// ```
#[async_trait]
pub trait TicketAction<K: ResourceKey>: Send + Sync + 'static {
    /// Run the action with the context handed out by the scheduler.
    async fn run(&self, ctx: TicketContext<K>);
}

/// Adapter turning a closure into a [`TicketAction`].
struct FnAction<F>(F);

#[async_trait]
impl<K, F, Fut> TicketAction<K> for FnAction<F>
where
    K: ResourceKey,
    F: Fn(TicketContext<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn run(&self, ctx: TicketContext<K>) {
        (self.0)(ctx).await;
    }
}

type PriorityTag = Arc<dyn Any + Send + Sync>;

struct TicketInner<K: ResourceKey> {
    id: TicketId,
    requirements: KeySet<K>,
    priority: Option<PriorityTag>,
    action: Arc<dyn TicketAction<K>>,
}

/// A unit of work that needs exclusive access to a non-empty set of keys.
///
/// `Ticket` is a cheap handle; clones share the same identity. Equality and
/// hashing go by identity, never by requirements.
pub struct Ticket<K: ResourceKey> {
    inner: Arc<TicketInner<K>>,
}

impl<K: ResourceKey> Ticket<K> {
    /// Build a ticket from an action.
    ///
    /// # Errors
    ///
    /// [`TicketError::EmptyKeys`] when `requirements` is empty.
    pub fn new(
        requirements: impl IntoIterator<Item = K>,
        action: impl TicketAction<K>,
    ) -> Result<Self, TicketError> {
        TicketBuilder::new(requirements).build(action)
    }

    /// Build a ticket from an async closure.
    ///
    /// # Errors
    ///
    /// [`TicketError::EmptyKeys`] when `requirements` is empty.
    pub fn from_fn<F, Fut>(
        requirements: impl IntoIterator<Item = K>,
        f: F,
    ) -> Result<Self, TicketError>
    where
        F: Fn(TicketContext<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        TicketBuilder::new(requirements).build_fn(f)
    }

    /// Start a builder, for tickets carrying a priority tag.
    pub fn builder(requirements: impl IntoIterator<Item = K>) -> TicketBuilder<K> {
        TicketBuilder::new(requirements)
    }

    /// Identity of this ticket instance.
    #[must_use]
    pub fn id(&self) -> TicketId {
        self.inner.id
    }

    /// Keys held while the action runs.
    #[must_use]
    pub fn requirements(&self) -> &KeySet<K> {
        &self.inner.requirements
    }

    /// True when this ticket and `other` need a common key.
    #[must_use]
    pub fn conflicts_with(&self, other: &Self) -> bool {
        overlaps(self.requirements(), other.requirements())
    }

    /// True when this ticket needs any key of `keys`.
    #[must_use]
    pub fn needs_any(&self, keys: &KeySet<K>) -> bool {
        overlaps(self.requirements(), keys)
    }

    /// The priority tag, if one of type `T` was attached.
    #[must_use]
    pub fn priority<T: Any>(&self) -> Option<&T> {
        self.inner.priority.as_deref().and_then(|tag| tag.downcast_ref::<T>())
    }

    pub(crate) fn action(&self) -> Arc<dyn TicketAction<K>> {
        Arc::clone(&self.inner.action)
    }
}

impl<K: ResourceKey> Clone for Ticket<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: ResourceKey> PartialEq for Ticket<K> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<K: ResourceKey> Eq for Ticket<K> {}

impl<K: ResourceKey> Hash for Ticket<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl<K: ResourceKey> fmt::Debug for Ticket<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("id", &self.inner.id)
            .field("requirements", &self.inner.requirements)
            .field("tagged", &self.inner.priority.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Ticket`].
pub struct TicketBuilder<K: ResourceKey> {
    requirements: KeySet<K>,
    priority: Option<PriorityTag>,
}

impl<K: ResourceKey> TicketBuilder<K> {
    /// Start from the required keys.
    pub fn new(requirements: impl IntoIterator<Item = K>) -> Self {
        Self {
            requirements: requirements.into_iter().collect(),
            priority: None,
        }
    }

    /// Attach an opaque priority tag for policies to inspect.
    #[must_use]
    pub fn with_priority<T: Any + Send + Sync>(mut self, tag: T) -> Self {
        self.priority = Some(Arc::new(tag));
        self
    }

    /// Finish with an action.
    ///
    /// # Errors
    ///
    /// [`TicketError::EmptyKeys`] when no keys were given.
    pub fn build(self, action: impl TicketAction<K>) -> Result<Ticket<K>, TicketError> {
        if self.requirements.is_empty() {
            return Err(TicketError::EmptyKeys);
        }
        Ok(Ticket {
            inner: Arc::new(TicketInner {
                id: TicketId::new(),
                requirements: self.requirements,
                priority: self.priority,
                action: Arc::new(action),
            }),
        })
    }

    /// Finish with an async closure.
    ///
    /// # Errors
    ///
    /// [`TicketError::EmptyKeys`] when no keys were given.
    pub fn build_fn<F, Fut>(self, f: F) -> Result<Ticket<K>, TicketError>
    where
        F: Fn(TicketContext<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.build(FnAction(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Priority;

    fn noop(keys: &[u8]) -> Ticket<u8> {
        Ticket::from_fn(keys.iter().copied(), |_ctx| async {}).unwrap()
    }

    #[test]
    fn test_empty_requirements_rejected() {
        let err = Ticket::<u8>::from_fn([], |_ctx| async {}).unwrap_err();
        assert_eq!(err, TicketError::EmptyKeys);
    }

    #[test]
    fn test_identity_is_per_instance() {
        let a = noop(&[1, 2]);
        let b = noop(&[1, 2]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn test_id_renders_as_uuid() {
        let id = noop(&[1]).id();
        assert_eq!(id.to_string(), id.as_uuid().to_string());
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn test_conflicts() {
        let ab = noop(&[1, 2]);
        let bc = noop(&[2, 3]);
        let cd = noop(&[3, 4]);
        assert!(ab.conflicts_with(&bc));
        assert!(!ab.conflicts_with(&cd));
    }

    #[test]
    fn test_priority_tag_downcast() {
        let ticket = Ticket::builder([1u8])
            .with_priority(Priority::High)
            .build_fn(|_ctx| async {})
            .unwrap();
        assert_eq!(ticket.priority::<Priority>(), Some(&Priority::High));
        assert_eq!(ticket.priority::<u32>(), None);
        assert_eq!(noop(&[1]).priority::<Priority>(), None);
    }

    #[test]
    fn test_outcome_from_cancelled() {
        assert!(Outcome::from_cancelled(true).is_cancelled());
        assert_eq!(Outcome::from_cancelled(false), Outcome::Completed);
    }
}
