//! Execution contexts and the composition layer over schedulers.

pub mod context;

pub use context::TicketContext;
