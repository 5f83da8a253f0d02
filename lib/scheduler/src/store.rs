//! Storage traits for automations and runs, with in-memory reference
//! implementations.
//!
//! The engine does not choose a persistence backend; it defines the store
//! contracts it needs and ships in-memory implementations used in tests and
//! single-process deployments. A database-backed store satisfies `claim_due`
//! with a single compare-and-set per run (suspended → running), which is
//! what makes resumption at-most-once under concurrent ticks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use copper_relay_core::{AutomationId, RunId};
use copper_relay_flow::automation::Automation;
use copper_relay_flow::run::{Run, RunStatus};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Mutex;

/// Errors from store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The underlying storage failed.
    StorageFailed { reason: String },
    /// Stored data could not be decoded.
    Corrupt { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StorageFailed { reason } => write!(f, "storage failed: {reason}"),
            Self::Corrupt { reason } => write!(f, "stored data corrupt: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Storage contract for automation definitions.
#[async_trait]
pub trait AutomationStore: Send + Sync {
    /// Gets an automation by ID.
    async fn get(&self, id: AutomationId) -> Result<Option<Automation>, StoreError>;

    /// Inserts or replaces an automation.
    async fn put(&self, automation: Automation) -> Result<(), StoreError>;

    /// Removes an automation. Returns true if it existed.
    async fn remove(&self, id: AutomationId) -> Result<bool, StoreError>;

    /// Lists all automations.
    async fn list(&self) -> Result<Vec<Automation>, StoreError>;

    /// Lists automations that are active.
    async fn list_active(&self) -> Result<Vec<Automation>, StoreError>;

    /// Increments an automation's run counter.
    async fn record_run(&self, id: AutomationId) -> Result<(), StoreError>;
}

/// Storage contract for runs.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Inserts a run under an admission dedup key.
    ///
    /// Returns false (and stores nothing) when a run was already admitted
    /// under the same key.
    async fn insert(&self, run: Run, dedup_key: String) -> Result<bool, StoreError>;

    /// Gets a run by ID.
    async fn get(&self, id: RunId) -> Result<Option<Run>, StoreError>;

    /// Persists the current state of a run.
    async fn update(&self, run: &Run) -> Result<(), StoreError>;

    /// Atomically claims suspended runs due at `now`, up to `limit`.
    ///
    /// Claiming flips each run to running in storage before it is returned,
    /// so a run can be picked up by exactly one resumption attempt even
    /// under concurrent ticks.
    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Run>, StoreError>;

    /// Lists all runs of an automation, newest first.
    async fn list_for_automation(&self, id: AutomationId) -> Result<Vec<Run>, StoreError>;

    /// Lists the suspended runs of an automation.
    async fn suspended_for_automation(&self, id: AutomationId) -> Result<Vec<Run>, StoreError>;

    /// Returns true if the automation has runs that are not yet terminal.
    async fn has_open_runs(&self, id: AutomationId) -> Result<bool, StoreError>;
}

/// Locks a store mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// In-memory automation store.
#[derive(Default)]
pub struct MemoryAutomationStore {
    automations: Mutex<HashMap<AutomationId, Automation>>,
}

impl MemoryAutomationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AutomationStore for MemoryAutomationStore {
    async fn get(&self, id: AutomationId) -> Result<Option<Automation>, StoreError> {
        Ok(lock(&self.automations).get(&id).cloned())
    }

    async fn put(&self, automation: Automation) -> Result<(), StoreError> {
        lock(&self.automations)
            .insert(automation.id, automation);
        Ok(())
    }

    async fn remove(&self, id: AutomationId) -> Result<bool, StoreError> {
        Ok(lock(&self.automations).remove(&id).is_some())
    }

    async fn list(&self) -> Result<Vec<Automation>, StoreError> {
        Ok(lock(&self.automations).values().cloned().collect())
    }

    async fn list_active(&self) -> Result<Vec<Automation>, StoreError> {
        Ok(lock(&self.automations)
            .values()
            .filter(|a| a.is_active)
            .cloned()
            .collect())
    }

    async fn record_run(&self, id: AutomationId) -> Result<(), StoreError> {
        let mut automations = lock(&self.automations);
        let automation = automations
            .get_mut(&id)
            .ok_or_else(|| StoreError::StorageFailed {
                reason: format!("automation not found: {id}"),
            })?;
        automation.record_run();
        Ok(())
    }
}

#[derive(Default)]
struct RunStoreInner {
    runs: HashMap<RunId, Run>,
    admitted: HashSet<String>,
}

/// In-memory run store.
#[derive(Default)]
pub struct MemoryRunStore {
    inner: Mutex<RunStoreInner>,
}

impl MemoryRunStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn insert(&self, run: Run, dedup_key: String) -> Result<bool, StoreError> {
        let mut inner = lock(&self.inner);
        if !inner.admitted.insert(dedup_key) {
            return Ok(false);
        }
        inner.runs.insert(run.id, run);
        Ok(true)
    }

    async fn get(&self, id: RunId) -> Result<Option<Run>, StoreError> {
        Ok(lock(&self.inner).runs.get(&id).cloned())
    }

    async fn update(&self, run: &Run) -> Result<(), StoreError> {
        lock(&self.inner).runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Run>, StoreError> {
        let mut inner = lock(&self.inner);

        let mut due: Vec<RunId> = inner
            .runs
            .values()
            .filter(|run| run.is_due(now))
            .map(|run| run.id)
            .collect();
        due.sort_by_key(|id| inner.runs[id].resume_at);
        due.truncate(limit);

        // The whole scan-and-flip happens under one lock, so a concurrent
        // claim observes these runs as already running.
        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            if let Some(run) = inner.runs.get_mut(&id) {
                run.resume();
                claimed.push(run.clone());
            }
        }
        Ok(claimed)
    }

    async fn list_for_automation(&self, id: AutomationId) -> Result<Vec<Run>, StoreError> {
        let inner = lock(&self.inner);
        let mut runs: Vec<Run> = inner
            .runs
            .values()
            .filter(|run| run.automation_id == id)
            .cloned()
            .collect();
        runs.sort_by_key(|run| std::cmp::Reverse(run.created_at));
        Ok(runs)
    }

    async fn suspended_for_automation(&self, id: AutomationId) -> Result<Vec<Run>, StoreError> {
        Ok(lock(&self.inner)
            .runs
            .values()
            .filter(|run| run.automation_id == id && run.status == RunStatus::Suspended)
            .cloned()
            .collect())
    }

    async fn has_open_runs(&self, id: AutomationId) -> Result<bool, StoreError> {
        Ok(lock(&self.inner)
            .runs
            .values()
            .any(|run| run.automation_id == id && !run.status.is_terminal()))
    }
}
