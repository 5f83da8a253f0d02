//! Automation management: the facade the API layer calls.
//!
//! Graphs are validated before they are persisted, so a graph with
//! error-severity findings never reaches the interpreter. Deleting an
//! automation with open runs is refused; deactivation is the supported way
//! to retire a flow while runs drain or are cancelled per policy.

use crate::error::ServiceError;
use copper_relay_core::{AutomationId, ContactId, ConversationId, EventId};
use copper_relay_flow::automation::{Automation, AutomationSummary};
use copper_relay_flow::run::Run;
use copper_relay_scheduler::{
    Admission, AutomationStore, RunScheduler, RunStore, TriggerEvent,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Context supplied with a manual trigger invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualInvocation {
    /// Contact to run the flow against, if any.
    pub contact_id: Option<ContactId>,
    /// Conversation to run the flow in, if any.
    pub conversation_id: Option<ConversationId>,
    /// Contact display name, seeded as `{name}`.
    pub contact_name: Option<String>,
}

/// Validated CRUD and lifecycle operations over automations.
pub struct AutomationService<A, R> {
    automations: Arc<A>,
    runs: Arc<R>,
    scheduler: Arc<RunScheduler<A, R>>,
}

impl<A, R> AutomationService<A, R>
where
    A: AutomationStore,
    R: RunStore,
{
    /// Creates a service over the given stores and scheduler.
    pub fn new(automations: Arc<A>, runs: Arc<R>, scheduler: Arc<RunScheduler<A, R>>) -> Self {
        Self {
            automations,
            runs,
            scheduler,
        }
    }

    /// Creates an automation after validating its graph.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidGraph`] when validation finds errors;
    /// warnings do not block saving.
    #[instrument(skip(self, automation), fields(automation = %automation.id))]
    pub async fn create(&self, automation: Automation) -> Result<AutomationId, ServiceError> {
        Self::check_graph(&automation)?;
        let id = automation.id;
        self.automations.put(automation).await?;
        info!("automation created");
        Ok(id)
    }

    /// Replaces an existing automation after validating its graph.
    #[instrument(skip(self, automation), fields(automation = %automation.id))]
    pub async fn update(&self, automation: Automation) -> Result<(), ServiceError> {
        Self::check_graph(&automation)?;
        if self.automations.get(automation.id).await?.is_none() {
            return Err(ServiceError::NotFound { id: automation.id });
        }
        self.automations.put(automation).await?;
        info!("automation updated");
        Ok(())
    }

    /// Gets an automation by ID.
    pub async fn get(&self, id: AutomationId) -> Result<Automation, ServiceError> {
        self.automations
            .get(id)
            .await?
            .ok_or(ServiceError::NotFound { id })
    }

    /// Lists automation summaries.
    pub async fn list(&self) -> Result<Vec<AutomationSummary>, ServiceError> {
        let automations = self.automations.list().await?;
        Ok(automations.iter().map(AutomationSummary::from).collect())
    }

    /// Toggles the active flag. Returns the new state.
    ///
    /// Deactivation blocks new admissions immediately and applies the
    /// configured suspended-run policy.
    #[instrument(skip(self), fields(automation = %id))]
    pub async fn toggle_active(&self, id: AutomationId) -> Result<bool, ServiceError> {
        let mut automation = self.get(id).await?;

        if automation.is_active {
            automation.deactivate();
            self.automations.put(automation).await?;
            let cancelled = self.scheduler.handle_deactivation(id).await?;
            info!(cancelled, "automation deactivated");
            Ok(false)
        } else {
            automation.activate();
            self.automations.put(automation).await?;
            info!("automation activated");
            Ok(true)
        }
    }

    /// Deletes an automation.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::RunsPending`] while the automation has
    /// non-terminal runs; deactivate instead and let them drain or cancel.
    #[instrument(skip(self), fields(automation = %id))]
    pub async fn delete(&self, id: AutomationId) -> Result<(), ServiceError> {
        if self.runs.has_open_runs(id).await? {
            return Err(ServiceError::RunsPending { id });
        }
        if !self.automations.remove(id).await? {
            return Err(ServiceError::NotFound { id });
        }
        info!("automation deleted");
        Ok(())
    }

    /// Returns how many runs the automation has admitted.
    pub async fn run_count(&self, id: AutomationId) -> Result<u64, ServiceError> {
        Ok(self.get(id).await?.run_count)
    }

    /// Returns the automation's runs, newest first.
    pub async fn run_history(&self, id: AutomationId) -> Result<Vec<Run>, ServiceError> {
        // Surface NotFound for unknown automations rather than an empty list.
        let _ = self.get(id).await?;
        Ok(self.runs.list_for_automation(id).await?)
    }

    /// Invokes an automation manually.
    ///
    /// Manual invocation bypasses trigger matching but not the activation
    /// and channel checks: a deactivated or unbound automation is refused.
    #[instrument(skip(self, invocation), fields(automation = %id))]
    pub async fn trigger_manually(
        &self,
        id: AutomationId,
        invocation: ManualInvocation,
    ) -> Result<Admission, ServiceError> {
        let automation = self.get(id).await?;
        let event = TriggerEvent::Manual {
            event_id: EventId::new(),
            channel_id: automation.channel_id,
            conversation_id: invocation.conversation_id,
            contact_id: invocation.contact_id,
            contact_name: invocation.contact_name,
        };
        Ok(self.scheduler.admit(id, &event).await?)
    }

    fn check_graph(automation: &Automation) -> Result<(), ServiceError> {
        let report = automation.validate();
        if report.is_ok() {
            Ok(())
        } else {
            Err(ServiceError::InvalidGraph {
                issues: report.errors().cloned().collect(),
            })
        }
    }
}
