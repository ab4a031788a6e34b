//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use ticket_lot::core::{Outcome, Scheduler, SchedulerSnapshot, Ticket, TicketError};
use ticket_lot::runtime::TicketContext;

/// Test resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    A,
    B,
    C,
    D,
}

pub const ALL: [Key; 4] = [Key::A, Key::B, Key::C, Key::D];

/// Fail the test instead of hanging forever.
pub async fn within_timeout<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("test timed out")
}

/// Drive `scheduler` on a background task from a root context.
pub fn spawn_scheduler(scheduler: &Scheduler<Key>) -> JoinHandle<Result<(), TicketError>> {
    let scheduler = scheduler.clone();
    tokio::spawn(async move { scheduler.run(TicketContext::root()).await })
}

/// Submit on a background task.
pub fn spawn_submit(
    scheduler: &Scheduler<Key>,
    ticket: &Ticket<Key>,
) -> JoinHandle<Result<Outcome, TicketError>> {
    let scheduler = scheduler.clone();
    let ticket = ticket.clone();
    tokio::spawn(async move { scheduler.submit(&ticket).await })
}

/// Poll snapshots until `pred` holds.
pub async fn wait_for<P>(scheduler: &Scheduler<Key>, mut pred: P) -> SchedulerSnapshot
where
    P: FnMut(&SchedulerSnapshot) -> bool,
{
    loop {
        let snapshot = scheduler.snapshot().await.expect("scheduler stopped");
        if pred(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Ticket that bumps `runs` and returns.
pub fn counting(keys: &[Key], runs: &Arc<AtomicUsize>) -> Ticket<Key> {
    let runs = Arc::clone(runs);
    Ticket::from_fn(keys.iter().copied(), move |_ctx| {
        let runs = Arc::clone(&runs);
        async move {
            runs.fetch_add(1, Ordering::SeqCst);
        }
    })
    .unwrap()
}

/// Ticket that signals `started`, then runs until it is asked to cancel.
pub fn until_cancelled(keys: &[Key], started: &Arc<Notify>) -> Ticket<Key> {
    let started = Arc::clone(started);
    Ticket::from_fn(keys.iter().copied(), move |ctx| {
        let started = Arc::clone(&started);
        async move {
            started.notify_one();
            ctx.cancelled().await;
        }
    })
    .unwrap()
}

/// Ticket that signals `started`, then ignores cancellation until `release`
/// is notified.
pub fn stubborn(keys: &[Key], started: &Arc<Notify>, release: &Arc<Notify>) -> Ticket<Key> {
    let started = Arc::clone(started);
    let release = Arc::clone(release);
    Ticket::from_fn(keys.iter().copied(), move |_ctx| {
        let started = Arc::clone(&started);
        let release = Arc::clone(&release);
        async move {
            started.notify_one();
            release.notified().await;
        }
    })
    .unwrap()
}
