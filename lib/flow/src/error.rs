//! Error types for the flow crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `GraphError`: Low-level graph operations (nodes, edges)
//! - `FlowError`: Run-fatal interpreter conditions
//!
//! Node-level side-effect failures are not errors at this layer: executors
//! fold them into a `Fail` outcome which the interpreter records on the run.

use crate::node::NodeId;
use copper_relay_core::AutomationId;
use std::fmt;

/// Errors from graph operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Node with the given ID was not found in the graph.
    NodeNotFound { node_id: NodeId },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound { node_id } => {
                write!(f, "node not found: {node_id}")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Conditions that fail a run inside the interpreter.
///
/// These are recorded on the run as its failure reason; they never propagate
/// out of the interpreter as panics or `Err` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// The per-run step ceiling was reached (cycle or runaway flow). Side
    /// effects already applied by earlier nodes are not rolled back; each
    /// node's effect committed externally when it executed.
    StepLimitExceeded { limit: u32 },
    /// A suspended run's cursor names a node that was edited out of the
    /// graph before resumption.
    ResumeTargetMissing {
        automation_id: AutomationId,
        node_id: NodeId,
    },
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StepLimitExceeded { limit } => {
                write!(f, "step limit exceeded ({limit} steps)")
            }
            Self::ResumeTargetMissing {
                automation_id,
                node_id,
            } => {
                write!(
                    f,
                    "resume target missing: {node_id} no longer exists in {automation_id}"
                )
            }
        }
    }
}

impl std::error::Error for FlowError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_display() {
        let node_id = NodeId::new();
        let err = GraphError::NodeNotFound { node_id };
        assert!(err.to_string().contains("node not found"));
    }

    #[test]
    fn step_limit_display() {
        let err = FlowError::StepLimitExceeded { limit: 500 };
        assert!(err.to_string().contains("step limit exceeded"));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn resume_target_missing_display() {
        let err = FlowError::ResumeTargetMissing {
            automation_id: AutomationId::new(),
            node_id: NodeId::new(),
        };
        assert!(err.to_string().contains("resume target missing"));
    }
}
