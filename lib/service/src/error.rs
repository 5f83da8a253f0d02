//! Error types for the service crate.

use copper_relay_core::AutomationId;
use copper_relay_flow::validate::ValidationIssue;
use copper_relay_scheduler::{SchedulerError, StoreError};
use std::fmt;

/// Errors from automation management operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// The referenced automation does not exist.
    NotFound { id: AutomationId },
    /// The graph failed validation; the error-severity findings are listed.
    InvalidGraph { issues: Vec<ValidationIssue> },
    /// The automation still has runs that are not terminal.
    RunsPending { id: AutomationId },
    /// A scheduler operation failed.
    Scheduler(SchedulerError),
    /// A store operation failed.
    Store(StoreError),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "automation not found: {id}"),
            Self::InvalidGraph { issues } => {
                write!(f, "graph validation failed ({} issue(s))", issues.len())
            }
            Self::RunsPending { id } => {
                write!(f, "automation {id} has pending runs; deactivate it instead")
            }
            Self::Scheduler(e) => write!(f, "scheduler error: {e}"),
            Self::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<SchedulerError> for ServiceError {
    fn from(e: SchedulerError) -> Self {
        Self::Scheduler(e)
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
