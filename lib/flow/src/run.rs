//! Run state for a single automation execution.
//!
//! A run is one live or archived execution of an automation, admitted by a
//! single trigger event. It advances one node at a time under the
//! interpreter, suspends durably at delay nodes, and is immutable once it
//! reaches a terminal status.

use crate::node::NodeId;
use crate::variables::VariableStore;
use chrono::{DateTime, Utc};
use copper_relay_core::{
    AutomationId, BookingId, ChannelId, ContactId, ConversationId, EventId, RunId,
};
use serde::{Deserialize, Serialize};

/// The status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The interpreter is (or may be) advancing this run.
    Running,
    /// Paused at a delay node; `resume_at` says when it becomes due.
    Suspended,
    /// Reached a terminal node or the graceful end of a branch.
    Completed,
    /// A node failed, the step ceiling was hit, or the run was cancelled.
    Failed,
}

impl RunStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// The event context that admitted a run.
///
/// Carries the references the admitting event naturally has; absent fields
/// simply leave their template variables unseeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerContext {
    /// Delivery identifier of the admitting event.
    pub event_id: Option<EventId>,
    /// Channel the conversation lives on.
    pub channel_id: Option<ChannelId>,
    /// Conversation the event belongs to.
    pub conversation_id: Option<ConversationId>,
    /// Contact on the other end.
    pub contact_id: Option<ContactId>,
    /// Booking referenced by the event, if any.
    pub booking_id: Option<BookingId>,
    /// Contact display name, seeded as `{name}`.
    pub contact_name: Option<String>,
    /// Service display name, seeded as `{service}`.
    pub service_name: Option<String>,
    /// Booking date display string, seeded as `{date}`.
    pub booking_date: Option<String>,
    /// Booking time display string, seeded as `{time}`.
    pub booking_time: Option<String>,
    /// Inbound message text, seeded as `{message}`.
    pub message_text: Option<String>,
    /// Requested booking start, used by create-booking nodes.
    pub requested_time: Option<DateTime<Utc>>,
}

impl TriggerContext {
    /// Seeds a variable store from this context.
    ///
    /// Only present fields are seeded; templates referencing the rest stay
    /// unresolved, which `VariableStore::resolve_template` preserves.
    #[must_use]
    pub fn seed_variables(&self) -> VariableStore {
        let mut vars = VariableStore::new();
        if let Some(name) = &self.contact_name {
            vars.set("name", name.clone());
        }
        if let Some(service) = &self.service_name {
            vars.set("service", service.clone());
        }
        if let Some(date) = &self.booking_date {
            vars.set("date", date.clone());
        }
        if let Some(time) = &self.booking_time {
            vars.set("time", time.clone());
        }
        if let Some(message) = &self.message_text {
            vars.set("message", message.clone());
        }
        vars
    }
}

/// A single execution of an automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier for this run.
    pub id: RunId,
    /// The automation being executed.
    pub automation_id: AutomationId,
    /// The node the interpreter executes next.
    pub cursor: NodeId,
    /// Current status.
    pub status: RunStatus,
    /// Per-run variable scratch space.
    pub variables: VariableStore,
    /// The event that admitted this run.
    pub context: TriggerContext,
    /// When a suspended run becomes due. Set only while suspended.
    pub resume_at: Option<DateTime<Utc>>,
    /// Failure reason, set when the run fails.
    pub failure: Option<String>,
    /// Number of node executions so far, across suspensions.
    pub steps_taken: u32,
    /// When the run was admitted.
    pub created_at: DateTime<Utc>,
    /// When the run was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// Creates a new running run positioned at the trigger node, with
    /// variables seeded from the trigger context.
    #[must_use]
    pub fn new(automation_id: AutomationId, entry: NodeId, context: TriggerContext) -> Self {
        let now = Utc::now();
        Self {
            id: RunId::new(),
            automation_id,
            cursor: entry,
            status: RunStatus::Running,
            variables: context.seed_variables(),
            context,
            resume_at: None,
            failure: None,
            steps_taken: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Suspends the run until `resume_at`.
    ///
    /// No-op on a terminal run.
    pub fn suspend(&mut self, resume_at: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RunStatus::Suspended;
        self.resume_at = Some(resume_at);
        self.updated_at = Utc::now();
    }

    /// Returns a suspended run to running, clearing its due time.
    ///
    /// No-op on a terminal run.
    pub fn resume(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RunStatus::Running;
        self.resume_at = None;
        self.updated_at = Utc::now();
    }

    /// Marks the run as completed. Terminal; later transitions are ignored.
    pub fn complete(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RunStatus::Completed;
        self.resume_at = None;
        self.updated_at = Utc::now();
    }

    /// Marks the run as failed with a reason. Terminal; later transitions
    /// are ignored.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RunStatus::Failed;
        self.failure = Some(reason.into());
        self.resume_at = None;
        self.updated_at = Utc::now();
    }

    /// Returns true if this suspended run is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == RunStatus::Suspended
            && self.resume_at.is_some_and(|at| at <= now)
    }
}
