//! Entity lifecycle scheduling
//!
//! One timer task per live entity, cancelled through a token hierarchy
//! rooted in the scheduler.

pub mod engine;
pub mod notify;
pub mod state;

pub use engine::{FinalizeOutcome, LifecycleScheduler, Membership, SchedulerOptions};
pub use notify::{LogNotifier, NoTickets, Notifier, NotifyResult, TicketSource};
pub use state::EntitySlot;
