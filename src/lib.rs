//! # Ticket Lot
//!
//! Resource-keyed scheduling for async control programs.
//!
//! Robots, rigs, and other machines have subsystems that must never be driven
//! by two routines at once: two autonomous routines fighting over the same
//! drive motors, or a homing sequence racing a teleop command for the lift.
//! `ticket_lot` lets each routine declare the resources it needs as a
//! [`Ticket`](core::Ticket) and guarantees that tickets with overlapping
//! requirements never run at the same time, while unrelated tickets run in
//! parallel without coordination.
//!
//! ## Key Features
//!
//! - **Single-writer state machine**: one run loop owns every scheduling
//!   decision; no locks around the ticket collections
//! - **Pluggable policies**: newest-wins preemption by default, plus demote,
//!   standby (FIFO), and priority-based admission, or bring your own
//! - **Cooperative preemption**: conflicting work is asked to stop through a
//!   cancellation token and keeps its resources until it does
//! - **Duplicate-safe submission**: the same ticket submitted from many
//!   places runs once; every caller hears the outcome
//! - **Nested scheduling**: `with_ticket` hands a routine its resources and a
//!   nested scheduler to split them further among sub-routines
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ticket_lot::core::PreemptPolicy;
//! use ticket_lot::runtime::TicketContext;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Hw { Drive, Lift, Claw }
//!
//! let root = TicketContext::root();
//! root.with_scheduler([Hw::Drive, Hw::Lift, Hw::Claw], Arc::new(PreemptPolicy), |ctx| async move {
//!     ctx.with_ticket([Hw::Lift, Hw::Claw], |ctx| async move {
//!         ctx.with_ticket([Hw::Lift], |_| async { raise().await; Ok(()) }).await?;
//!         ctx.with_ticket([Hw::Claw], |_| async { release().await; Ok(()) }).await
//!     })
//!     .await
//! })
//! .await??;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: keys, tickets, policies, and the scheduler.
pub mod core;
/// Configuration models for schedulers.
pub mod config;
/// Builders to construct schedulers from code or configuration.
pub mod builders;
/// Execution contexts and the composition layer.
pub mod runtime;
/// Shared utilities.
pub mod util;
