//! Execution contexts: binding schedulers to structured regions.
//!
//! A [`TicketContext`] is passed explicitly down the call chain. It carries
//! the cancellation token of the current unit of work, the task tracker of the
//! region that owns spawned work, and the scheduler (if any) that tickets run
//! from this context should be submitted to.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::core::key::{KeySet, ResourceKey};
use crate::core::{DelegatingPolicy, Outcome, Scheduler, SharedPolicy, Ticket, TicketError};

/// Explicit execution context for ticket-scheduled work.
pub struct TicketContext<K: ResourceKey> {
    token: CancellationToken,
    tracker: TaskTracker,
    scheduler: Option<Scheduler<K>>,
}

impl<K: ResourceKey> TicketContext<K> {
    /// A top-level context: fresh token, fresh region, no scheduler bound.
    #[must_use]
    pub fn root() -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            scheduler: None,
        }
    }

    /// A top-level context with `scheduler` bound, for schedulers driven by
    /// hand rather than through [`TicketContext::with_scheduler`].
    #[must_use]
    pub fn bound(scheduler: Scheduler<K>) -> Self {
        Self {
            scheduler: Some(scheduler),
            ..Self::root()
        }
    }

    pub(crate) fn for_action(&self, token: CancellationToken) -> Self {
        Self {
            token,
            tracker: self.tracker.clone(),
            scheduler: self.scheduler.clone(),
        }
    }

    pub(crate) const fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Cancellation token of the current unit of work.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Run `fut` until it completes or cancellation is requested, whichever
    /// comes first. `None` means it was cut short.
    pub async fn run_until_cancelled<F: Future>(&self, fut: F) -> Option<F::Output> {
        self.token.run_until_cancelled(fut).await
    }

    /// The scheduler bound to this context.
    ///
    /// # Errors
    ///
    /// [`TicketError::NoScheduler`] when none is bound.
    pub fn scheduler(&self) -> Result<&Scheduler<K>, TicketError> {
        self.scheduler.as_ref().ok_or(TicketError::NoScheduler)
    }

    /// Spawn `fut` inside this context's region; the region waits for it
    /// before it closes.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(fut)
    }

    /// Open a region with a new scheduler over `available`, run `body` in it,
    /// then stop the scheduler and wait for everything the region launched.
    ///
    /// `body` is abandoned at its next suspension point if this context is
    /// cancelled, in which case the result is [`TicketError::Cancelled`].
    ///
    /// # Errors
    ///
    /// [`TicketError::EmptyKeys`] for an empty key set,
    /// [`TicketError::Cancelled`] as above, or the run loop's own error.
    pub async fn with_scheduler<F, Fut, T>(
        &self,
        available: impl IntoIterator<Item = K>,
        policy: SharedPolicy<K>,
        body: F,
    ) -> Result<T, TicketError>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = T>,
    {
        let scheduler = Scheduler::with_policy(available, policy)?;
        self.within(scheduler, body).await
    }

    /// Like [`TicketContext::with_scheduler`] for a scheduler that was
    /// already built (for example by `SchedulerBuilder`). The scheduler must
    /// not be running yet.
    ///
    /// # Errors
    ///
    /// [`TicketError::Cancelled`] if this context is cancelled before `body`
    /// returns, or the run loop's own error.
    pub async fn within<F, Fut, T>(
        &self,
        scheduler: Scheduler<K>,
        body: F,
    ) -> Result<T, TicketError>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = T>,
    {
        let region = Self {
            token: self.token.child_token(),
            tracker: TaskTracker::new(),
            scheduler: Some(scheduler.clone()),
        };
        // Actions launched by the loop inherit the scheduler enclosing the region.
        let driver_ctx = Self {
            token: region.token.clone(),
            tracker: region.tracker.clone(),
            scheduler: self.scheduler.clone(),
        };
        let driver = region.tracker.spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run(driver_ctx).await }
        });

        let result = region.token.run_until_cancelled(body(region.clone())).await;

        scheduler.stop();
        region.tracker.close();
        region.tracker.wait().await;
        debug!(scheduler = scheduler.name(), cancelled = result.is_none(), "region closed");

        match driver.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(err) => return Err(TicketError::Internal(format!("scheduler loop failed: {err}"))),
        }
        result.ok_or(TicketError::Cancelled)
    }

    /// Submit `ticket` to the bound scheduler and wait for it.
    ///
    /// # Errors
    ///
    /// [`TicketError::NoScheduler`] when no scheduler is bound,
    /// [`TicketError::Cancelled`] when the scheduler cancelled the ticket,
    /// plus anything [`Scheduler::submit`] reports.
    pub async fn run_ticket(&self, ticket: &Ticket<K>) -> Result<(), TicketError> {
        match self.scheduler()?.submit(ticket).await? {
            Outcome::Completed => Ok(()),
            Outcome::Cancelled => Err(TicketError::Cancelled),
        }
    }

    /// Acquire `required` from the bound scheduler and run `body` while
    /// holding them.
    ///
    /// `body` runs under a nested scheduler over exactly `required` that
    /// follows the outer scheduler's live policy, so nested `with_ticket`
    /// calls split the granted keys without contending at the outer level.
    /// A `TicketError::Cancelled` returned by `body` cancels the enclosing
    /// ticket as well.
    ///
    /// ```rust,ignore
    /// ctx.with_ticket([Arm, Gripper], |ctx| async move {
    ///     ctx.with_ticket([Arm], |_| async { move_arm().await; Ok(()) }).await?;
    ///     ctx.with_ticket([Gripper], |_| async { close().await; Ok(()) }).await
    /// })
    /// .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// [`TicketError::NoScheduler`], [`TicketError::EmptyKeys`],
    /// [`TicketError::UnknownKeys`], [`TicketError::Cancelled`], or the error
    /// `body` returned.
    pub async fn with_ticket<F, Fut, T>(
        &self,
        required: impl IntoIterator<Item = K>,
        body: F,
    ) -> Result<T, TicketError>
    where
        F: FnOnce(Self) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TicketError>> + Send + 'static,
        T: Send + 'static,
    {
        let outer = self.scheduler()?.clone();
        let required: KeySet<K> = required.into_iter().collect();
        let body = Arc::new(Mutex::new(Some(body)));
        let slot: Arc<Mutex<Option<Result<T, TicketError>>>> = Arc::new(Mutex::new(None));

        let ticket = {
            let keys = required.clone();
            let slot = Arc::clone(&slot);
            Ticket::from_fn(required, move |ctx: Self| {
                let keys = keys.clone();
                let parent = outer.clone();
                let body = body.lock().take();
                let slot = Arc::clone(&slot);
                async move {
                    // A resubmitted handle has nothing left to run.
                    let Some(body) = body else { return };
                    let policy: SharedPolicy<K> = Arc::new(DelegatingPolicy::new(parent));
                    let result = ctx
                        .with_scheduler(keys, policy, body)
                        .await
                        .and_then(|inner| inner);
                    if matches!(result, Err(TicketError::Cancelled)) {
                        ctx.token().cancel();
                    }
                    *slot.lock() = Some(result);
                }
            })?
        };

        self.run_ticket(&ticket).await?;
        let result = slot.lock().take();
        result.unwrap_or_else(|| {
            Err(TicketError::Internal(
                "ticket finished without a result".into(),
            ))
        })
    }
}

impl<K: ResourceKey> Clone for TicketContext<K> {
    fn clone(&self) -> Self {
        Self {
            token: self.token.clone(),
            tracker: self.tracker.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<K: ResourceKey> fmt::Debug for TicketContext<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketContext")
            .field("cancelled", &self.token.is_cancelled())
            .field("scheduler", &self.scheduler.as_ref().map(Scheduler::name))
            .finish_non_exhaustive()
    }
}

impl<K: ResourceKey> Default for TicketContext<K> {
    fn default() -> Self {
        Self::root()
    }
}
