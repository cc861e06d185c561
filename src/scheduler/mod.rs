//! Scheduled broadcast module.
//!
//! Posts the configured message to the configured chat at a fixed
//! interval, independent of chat traffic.

mod runner;
mod state;

pub use runner::{BroadcastScheduler, SchedulerHandle, SchedulerMessage, broadcast_action};
pub use state::{SchedulerPhase, SchedulerState};
