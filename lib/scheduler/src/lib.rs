//! Run scheduling and trigger matching for the copper-relay engine.
//!
//! This crate owns the lifecycle around the flow interpreter:
//!
//! - **Trigger Matcher**: decides which automations an external event starts
//! - **Run Scheduler**: admits runs (with event deduplication), resumes
//!   suspended runs when due, and cancels runs
//! - **Stores**: contracts for automation and run persistence, with
//!   in-memory reference implementations
//! - **Configuration**: engine limits and policies loaded from environment

pub mod config;
pub mod error;
pub mod event;
pub mod matcher;
pub mod scheduler;
pub mod store;

pub use config::{EngineConfig, SuspendedRunPolicy};
pub use error::SchedulerError;
pub use event::TriggerEvent;
pub use matcher::match_event;
pub use scheduler::{Admission, RunScheduler, TickSummary};
pub use store::{
    AutomationStore, MemoryAutomationStore, MemoryRunStore, RunStore, StoreError,
};
