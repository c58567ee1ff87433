//! Raffler - crash-safe scheduler for timed giveaways and tournaments
//!
//! Entities (giveaways and tournament phases) are persisted through an
//! [`store::EntityStore`], driven to a terminal state by the
//! [`scheduler::LifecycleScheduler`], and reconciled after a restart by
//! [`recovery::RecoveryManager`].

pub mod chain;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod observability;
pub mod rate_limit;
pub mod recovery;
pub mod scheduler;
pub mod selector;
pub mod store;
