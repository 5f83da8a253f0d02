//! Structural validation for automation flow graphs.
//!
//! Validation runs before an automation is saved; a graph that fails with
//! errors never reaches the interpreter. Warnings (unreachable nodes) are
//! surfaced to the author but do not block saving — unreachable nodes simply
//! never execute.
//!
//! Cycles are not findings: automations may loop back to earlier nodes, and
//! the interpreter's step ceiling is what bounds runaway flows.

use crate::edge::BranchLabel;
use crate::graph::FlowGraph;
use crate::node::{NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Blocks saving the graph.
    Error,
    /// Surfaced to the author, does not block saving.
    Warning,
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ValidationIssue {
    /// The graph has no trigger node.
    MissingTrigger,
    /// The graph has more than one trigger node.
    DuplicateTrigger { node_id: NodeId },
    /// The trigger node has incoming edges.
    TriggerHasIncomingEdges { node_id: NodeId },
    /// A condition node has more than one edge with the same branch label.
    DuplicateBranchLabel { node_id: NodeId, label: BranchLabel },
    /// A node has more than one unlabeled outgoing edge.
    BranchingOutEdges { node_id: NodeId },
    /// A non-condition node has a branch-labeled outgoing edge.
    LabeledEdgeFromNonCondition { node_id: NodeId },
    /// The graph has no end-flow node.
    MissingEndFlow,
    /// An end-flow node has outgoing edges.
    EndFlowHasOutgoingEdges { node_id: NodeId },
    /// A condition node has no branch-labeled outgoing edges at all.
    ConditionWithoutBranches { node_id: NodeId },
    /// A non-trigger node is not reachable from the trigger.
    UnreachableNode { node_id: NodeId },
}

impl ValidationIssue {
    /// Returns the severity of this finding.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::UnreachableNode { .. } | Self::ConditionWithoutBranches { .. } => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTrigger => write!(f, "graph has no trigger node"),
            Self::DuplicateTrigger { node_id } => {
                write!(f, "more than one trigger node ({node_id})")
            }
            Self::TriggerHasIncomingEdges { node_id } => {
                write!(f, "trigger node {node_id} has incoming edges")
            }
            Self::DuplicateBranchLabel { node_id, label } => {
                write!(f, "condition {node_id} has multiple '{label}' edges")
            }
            Self::BranchingOutEdges { node_id } => {
                write!(f, "node {node_id} has more than one unlabeled outgoing edge")
            }
            Self::LabeledEdgeFromNonCondition { node_id } => {
                write!(f, "non-condition node {node_id} has a branch-labeled edge")
            }
            Self::MissingEndFlow => write!(f, "graph has no end-flow node"),
            Self::EndFlowHasOutgoingEdges { node_id } => {
                write!(f, "end-flow node {node_id} has outgoing edges")
            }
            Self::ConditionWithoutBranches { node_id } => {
                write!(f, "condition {node_id} has no branch edges")
            }
            Self::UnreachableNode { node_id } => {
                write!(f, "node {node_id} is not reachable from the trigger")
            }
        }
    }
}

/// The findings of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// All findings, errors and warnings.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Returns true if no error-severity findings exist.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Iterates over error-severity findings.
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity() == Severity::Error)
    }

    /// Iterates over warning-severity findings.
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity() == Severity::Warning)
    }
}

/// Validates the structure of a flow graph.
#[must_use]
pub fn validate_graph(graph: &FlowGraph) -> ValidationReport {
    let mut issues = Vec::new();

    let triggers: Vec<NodeId> = graph
        .nodes()
        .filter(|n| n.is_trigger())
        .map(|n| n.id)
        .collect();

    match triggers.as_slice() {
        [] => issues.push(ValidationIssue::MissingTrigger),
        [_single] => {}
        [_, extras @ ..] => {
            for &node_id in extras {
                issues.push(ValidationIssue::DuplicateTrigger { node_id });
            }
        }
    }

    for &node_id in &triggers {
        if graph.in_degree(node_id) > 0 {
            issues.push(ValidationIssue::TriggerHasIncomingEdges { node_id });
        }
    }

    let mut has_end_flow = false;
    for node in graph.nodes() {
        let out_edges = graph.out_edges(node.id);
        let unlabeled = out_edges.iter().filter(|e| e.label.is_none()).count();
        let true_edges = out_edges
            .iter()
            .filter(|e| e.label == Some(BranchLabel::True))
            .count();
        let false_edges = out_edges
            .iter()
            .filter(|e| e.label == Some(BranchLabel::False))
            .count();

        if unlabeled > 1 {
            issues.push(ValidationIssue::BranchingOutEdges { node_id: node.id });
        }

        match node.kind() {
            NodeKind::Condition => {
                if true_edges > 1 {
                    issues.push(ValidationIssue::DuplicateBranchLabel {
                        node_id: node.id,
                        label: BranchLabel::True,
                    });
                }
                if false_edges > 1 {
                    issues.push(ValidationIssue::DuplicateBranchLabel {
                        node_id: node.id,
                        label: BranchLabel::False,
                    });
                }
                if true_edges == 0 && false_edges == 0 {
                    issues.push(ValidationIssue::ConditionWithoutBranches { node_id: node.id });
                }
            }
            NodeKind::EndFlow => {
                has_end_flow = true;
                if !out_edges.is_empty() {
                    issues.push(ValidationIssue::EndFlowHasOutgoingEdges { node_id: node.id });
                }
            }
            _ => {
                if true_edges + false_edges > 0 {
                    issues.push(ValidationIssue::LabeledEdgeFromNonCondition { node_id: node.id });
                }
            }
        }
    }

    if graph.node_count() > 0 && !has_end_flow {
        issues.push(ValidationIssue::MissingEndFlow);
    }

    // Reachability only makes sense with an unambiguous entry point.
    if let [trigger_id] = triggers.as_slice() {
        let reachable = graph.reachable_from(*trigger_id);
        for node in graph.nodes() {
            if !reachable.contains(&node.id) {
                issues.push(ValidationIssue::UnreachableNode { node_id: node.id });
            }
        }
    }

    ValidationReport { issues }
}
