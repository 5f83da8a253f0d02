//! Automation definition types.
//!
//! An automation is a user-authored flow graph bound to a trigger and a
//! messaging channel. The graph is the source of truth for execution; the
//! trigger specification is what the matcher inspects when events arrive.

use crate::graph::FlowGraph;
use crate::validate::{self, ValidationReport};
use chrono::{DateTime, Utc};
use copper_relay_core::{AutomationId, ChannelId};
use serde::{Deserialize, Serialize};

/// Booking lifecycle states referenced by status-change triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        };
        write!(f, "{name}")
    }
}

/// The kind of trigger, without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    NewConversation,
    Keyword,
    BookingCreated,
    BookingStatusChanged,
    Manual,
}

/// The entry condition that admits new runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSpec {
    /// Fires when a conversation starts on the bound channel.
    NewConversation,
    /// Fires when an inbound message contains any configured keyword
    /// (case-insensitive substring).
    Keyword {
        /// Keywords to match against inbound message text.
        keywords: Vec<String>,
    },
    /// Fires when a booking is created.
    BookingCreated,
    /// Fires when a booking changes status, optionally filtered to one
    /// target status.
    BookingStatusChanged {
        /// Only fire for this status; `None` fires for every change.
        status: Option<BookingStatus>,
    },
    /// Never matched automatically; admitted only by explicit invocation.
    Manual,
}

impl TriggerSpec {
    /// Returns the trigger kind.
    #[must_use]
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::NewConversation => TriggerKind::NewConversation,
            Self::Keyword { .. } => TriggerKind::Keyword,
            Self::BookingCreated => TriggerKind::BookingCreated,
            Self::BookingStatusChanged { .. } => TriggerKind::BookingStatusChanged,
            Self::Manual => TriggerKind::Manual,
        }
    }
}

/// A user-authored automation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    /// Unique identifier for this automation.
    pub id: AutomationId,
    /// Human-readable name.
    pub name: String,
    /// Description of what this automation does.
    pub description: Option<String>,
    /// The entry condition that admits runs.
    pub trigger: TriggerSpec,
    /// Whether this automation admits new runs.
    pub is_active: bool,
    /// The messaging channel this automation is bound to. An automation
    /// without a channel cannot run.
    pub channel_id: Option<ChannelId>,
    /// The flow graph (nodes and edges).
    pub graph: FlowGraph,
    /// Number of runs admitted so far.
    pub run_count: u64,
    /// When this automation was created.
    pub created_at: DateTime<Utc>,
    /// When this automation was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Automation {
    /// Creates a new active automation with an empty graph.
    #[must_use]
    pub fn new(name: impl Into<String>, trigger: TriggerSpec) -> Self {
        let now = Utc::now();
        Self {
            id: AutomationId::new(),
            name: name.into(),
            description: None,
            trigger,
            is_active: true,
            channel_id: None,
            graph: FlowGraph::new(),
            run_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Binds the automation to a channel.
    #[must_use]
    pub fn with_channel(mut self, channel_id: ChannelId) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns true if this automation may admit runs: it must be active
    /// and bound to a channel.
    #[must_use]
    pub fn can_run(&self) -> bool {
        self.is_active && self.channel_id.is_some()
    }

    /// Activates the automation.
    pub fn activate(&mut self) {
        self.is_active = true;
        self.touch();
    }

    /// Deactivates the automation. New runs stop being admitted immediately;
    /// already-suspended runs are handled by the scheduler's policy.
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.touch();
    }

    /// Records an admitted run.
    pub fn record_run(&mut self) {
        self.run_count += 1;
        self.touch();
    }

    /// Validates the flow graph.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        validate::validate_graph(&self.graph)
    }

    /// Marks the automation as updated (bumps updated_at timestamp).
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Summary information about an automation (for listings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationSummary {
    /// Automation ID.
    pub id: AutomationId,
    /// Automation name.
    pub name: String,
    /// Trigger kind.
    pub trigger_kind: TriggerKind,
    /// Whether active.
    pub is_active: bool,
    /// Whether bound to a channel.
    pub has_channel: bool,
    /// Number of nodes in the graph.
    pub node_count: usize,
    /// Number of runs admitted so far.
    pub run_count: u64,
    /// Last updated timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<&Automation> for AutomationSummary {
    fn from(automation: &Automation) -> Self {
        Self {
            id: automation.id,
            name: automation.name.clone(),
            trigger_kind: automation.trigger.kind(),
            is_active: automation.is_active,
            has_channel: automation.channel_id.is_some(),
            node_count: automation.graph.node_count(),
            run_count: automation.run_count,
            updated_at: automation.updated_at,
        }
    }
}
