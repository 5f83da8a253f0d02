//! Error types for the scheduler crate.

use crate::store::StoreError;
use copper_relay_core::AutomationId;
use std::fmt;

/// Errors from scheduler operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// A store operation failed.
    Store(StoreError),
    /// The referenced automation does not exist.
    AutomationNotFound { id: AutomationId },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::AutomationNotFound { id } => write!(f, "automation not found: {id}"),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl From<StoreError> for SchedulerError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
