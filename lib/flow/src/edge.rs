//! Edge types for automation flow graphs.
//!
//! Edges connect nodes. A condition node routes through edges labeled
//! `true`/`false`; every other node follows its single unlabeled edge.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};

/// Branch discriminator carried by edges leaving a condition node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchLabel {
    /// Taken when the condition evaluates to true.
    True,
    /// Taken when the condition evaluates to false.
    False,
}

impl BranchLabel {
    /// Returns the label matching an evaluator verdict.
    #[must_use]
    pub fn from_verdict(holds: bool) -> Self {
        if holds { Self::True } else { Self::False }
    }
}

impl std::fmt::Display for BranchLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
        }
    }
}

/// An edge between two nodes in a flow graph.
///
/// The endpoints live in the graph structure; the edge itself carries only
/// the optional branch label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Branch discriminator; present only on edges leaving a condition node.
    pub label: Option<BranchLabel>,
}

impl Edge {
    /// Creates an unlabeled edge (linear flow).
    #[must_use]
    pub fn unlabeled() -> Self {
        Self { label: None }
    }

    /// Creates a labeled branch edge.
    #[must_use]
    pub fn branch(label: BranchLabel) -> Self {
        Self { label: Some(label) }
    }

    /// Returns true if this edge carries a branch label.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        self.label.is_some()
    }
}

impl Default for Edge {
    fn default() -> Self {
        Self::unlabeled()
    }
}

/// A complete edge reference including source and target node IDs.
///
/// This is used for external representation and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRef {
    /// The source node ID.
    pub source: NodeId,
    /// The target node ID.
    pub target: NodeId,
    /// Branch discriminator, if any.
    pub label: Option<BranchLabel>,
}

impl EdgeRef {
    /// Creates a new edge reference.
    #[must_use]
    pub fn new(source: NodeId, target: NodeId, label: Option<BranchLabel>) -> Self {
        Self {
            source,
            target,
            label,
        }
    }
}
