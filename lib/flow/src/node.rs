//! Automation flow node types and configurations.
//!
//! Nodes are the building blocks of an automation graph. Each node has:
//! - A unique ID within the automation
//! - A kind-specific configuration (the nine-variant closed set)
//! - A canvas position used only by the builder UI

use chrono::Duration;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// A unique identifier for a node within an automation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Ulid);

impl NodeId {
    /// Creates a new random node ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates a node ID from a ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// The kind of a flow node.
///
/// This is the discriminant of [`NodeConfig`]; executors match exhaustively
/// over the configuration, so adding a kind is a compile-time visible change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry point that admits the run.
    Trigger,
    /// Deliver a templated message on the automation's bound channel.
    SendMessage,
    /// Submit a prompt to the AI collaborator.
    AiStep,
    /// Route to the true/false branch based on an expression.
    Condition,
    /// Suspend the run for a configured interval.
    Delay,
    /// Create a booking for the contact.
    CreateBooking,
    /// Write a value into the run's variable store.
    SetVariable,
    /// Apply a tag to the contact.
    TagUser,
    /// Terminal node.
    EndFlow,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Trigger => "trigger",
            Self::SendMessage => "send_message",
            Self::AiStep => "ai_step",
            Self::Condition => "condition",
            Self::Delay => "delay",
            Self::CreateBooking => "create_booking",
            Self::SetVariable => "set_variable",
            Self::TagUser => "tag_user",
            Self::EndFlow => "end_flow",
        };
        write!(f, "{name}")
    }
}

/// Units for delay node intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayUnit {
    Minutes,
    Hours,
    Days,
}

impl DelayUnit {
    /// Converts an amount in this unit to a duration.
    #[must_use]
    pub fn duration(self, amount: u32) -> Duration {
        let amount = i64::from(amount);
        match self {
            Self::Minutes => Duration::minutes(amount),
            Self::Hours => Duration::hours(amount),
            Self::Days => Duration::days(amount),
        }
    }
}

/// Configuration for a node, varying by kind.
///
/// Text fields (`text`, `prompt`, `value`) may contain `{variable}`
/// placeholders resolved against the run's variable store at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeConfig {
    /// Entry point; exactly one per automation. Executes as a no-op.
    Trigger,
    /// Deliver a templated message to the contact.
    SendMessage {
        /// Message text with `{variable}` placeholders.
        text: String,
    },
    /// Submit the resolved prompt to the AI collaborator. The response is
    /// stored in the reserved `lastAiResponse` variable for downstream nodes.
    AiStep {
        /// Prompt text with `{variable}` placeholders.
        prompt: String,
    },
    /// Evaluate an expression and route to the `true`- or `false`-labeled edge.
    Condition {
        /// Restricted boolean expression over run variables.
        expression: String,
    },
    /// Suspend the run; the scheduler resumes it after the interval elapses.
    Delay {
        /// Interval amount.
        amount: u32,
        /// Interval unit.
        unit: DelayUnit,
    },
    /// Create a booking through the booking collaborator.
    CreateBooking {
        /// Service to book. Falls back to the run's `{service}` context when absent.
        service: Option<String>,
    },
    /// Write a resolved value into the variable store.
    SetVariable {
        /// Variable name (case-sensitive).
        name: String,
        /// Value with `{variable}` placeholders.
        value: String,
    },
    /// Apply a tag to the contact. Best-effort: tagging failures are logged,
    /// never fatal to the run.
    TagUser {
        /// Tag name.
        tag: String,
    },
    /// Terminal node; completes the run.
    EndFlow,
}

impl NodeConfig {
    /// Returns the kind of this node configuration.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Trigger => NodeKind::Trigger,
            Self::SendMessage { .. } => NodeKind::SendMessage,
            Self::AiStep { .. } => NodeKind::AiStep,
            Self::Condition { .. } => NodeKind::Condition,
            Self::Delay { .. } => NodeKind::Delay,
            Self::CreateBooking { .. } => NodeKind::CreateBooking,
            Self::SetVariable { .. } => NodeKind::SetVariable,
            Self::TagUser { .. } => NodeKind::TagUser,
            Self::EndFlow => NodeKind::EndFlow,
        }
    }
}

/// Canvas position of a node in the builder UI.
///
/// Presentation-only; execution never consults it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node in an automation flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier for this node within the automation.
    pub id: NodeId,
    /// Human-readable name for this node.
    pub name: String,
    /// Node configuration (determines kind and behavior).
    pub config: NodeConfig,
    /// Canvas position (presentation only).
    #[serde(default)]
    pub position: Position,
}

impl Node {
    /// Creates a new node with the given configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            config,
            position: Position::default(),
        }
    }

    /// Creates a new node with a specific ID.
    #[must_use]
    pub fn with_id(id: NodeId, name: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id,
            name: name.into(),
            config,
            position: Position::default(),
        }
    }

    /// Returns the kind of this node.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }

    /// Returns true if this is the trigger entry point.
    #[must_use]
    pub fn is_trigger(&self) -> bool {
        self.kind() == NodeKind::Trigger
    }

    /// Returns true if this node branches on a condition.
    #[must_use]
    pub fn is_condition(&self) -> bool {
        self.kind() == NodeKind::Condition
    }

    /// Returns true if this node terminates the run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.kind() == NodeKind::EndFlow
    }
}
