//! Automation flow graph implementation using petgraph.
//!
//! Flows are directed graphs where:
//! - Nodes are typed automation steps
//! - Edges connect a step to its successor(s), optionally branch-labeled
//!
//! Cycles are representable and permitted: an automation may loop back to an
//! earlier node (e.g. via a condition). Runaway loops are bounded at run time
//! by the interpreter's step ceiling, not rejected here.
//!
//! The graph structure is plain serializable data with no embedded behavior;
//! the builder UI's callback wiring never reaches this representation.

use crate::edge::{BranchLabel, Edge, EdgeRef};
use crate::error::GraphError;
use crate::node::{Node, NodeId};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef as _;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// A directed automation flow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowGraph {
    /// The underlying directed graph.
    #[serde(with = "graph_serde")]
    graph: DiGraph<Node, Edge>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    #[serde(skip)]
    node_index_map: HashMap<NodeId, NodeIndex>,
}

impl FlowGraph {
    /// Creates a new empty flow graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_index_map: HashMap::new(),
        }
    }

    /// Adds a node to the graph.
    ///
    /// Returns the node ID.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let node_id = node.id;
        let index = self.graph.add_node(node);
        self.node_index_map.insert(node_id, index);
        node_id
    }

    /// Removes a node from the graph.
    ///
    /// Also removes all edges connected to this node. Indices are rebuilt
    /// because petgraph reuses the removed slot for the last node.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let index = self.node_index_map.remove(&node_id)?;
        let removed = self.graph.remove_node(index);
        self.rebuild_index_map();
        removed
    }

    /// Returns a reference to a node by its ID.
    #[must_use]
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        let index = self.node_index_map.get(&node_id)?;
        self.graph.node_weight(*index)
    }

    /// Returns a mutable reference to a node by its ID.
    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        let index = self.node_index_map.get(&node_id)?;
        self.graph.node_weight_mut(*index)
    }

    /// Adds an edge between two nodes.
    ///
    /// Branch-label rules (at most one `true`/`false` per condition node,
    /// single out-edge for linear nodes) are enforced by
    /// [`crate::validate::validate_graph`], not here, so the builder can
    /// stage intermediate states.
    ///
    /// # Errors
    ///
    /// Returns an error if the source or target node doesn't exist.
    pub fn add_edge(
        &mut self,
        source_id: NodeId,
        target_id: NodeId,
        edge: Edge,
    ) -> Result<(), GraphError> {
        let source_index = *self
            .node_index_map
            .get(&source_id)
            .ok_or(GraphError::NodeNotFound { node_id: source_id })?;

        let target_index = *self
            .node_index_map
            .get(&target_id)
            .ok_or(GraphError::NodeNotFound { node_id: target_id })?;

        self.graph.add_edge(source_index, target_index, edge);
        Ok(())
    }

    /// Returns all nodes in the graph.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the trigger node, if exactly one exists.
    #[must_use]
    pub fn trigger_node(&self) -> Option<&Node> {
        let mut triggers = self.nodes().filter(|n| n.is_trigger());
        let first = triggers.next()?;
        if triggers.next().is_some() {
            return None;
        }
        Some(first)
    }

    /// Returns the outgoing edges of a node as full edge references.
    #[must_use]
    pub fn out_edges(&self, node_id: NodeId) -> Vec<EdgeRef> {
        let Some(&index) = self.node_index_map.get(&node_id) else {
            return Vec::new();
        };

        self.graph
            .edges_directed(index, Direction::Outgoing)
            .filter_map(|edge| {
                let target = self.graph.node_weight(edge.target())?;
                Some(EdgeRef::new(node_id, target.id, edge.weight().label))
            })
            .collect()
    }

    /// Returns the number of incoming edges of a node.
    #[must_use]
    pub fn in_degree(&self, node_id: NodeId) -> usize {
        let Some(&index) = self.node_index_map.get(&node_id) else {
            return 0;
        };
        self.graph.edges_directed(index, Direction::Incoming).count()
    }

    /// Returns the target of the node's first unlabeled out-edge.
    #[must_use]
    pub fn next_after(&self, node_id: NodeId) -> Option<NodeId> {
        self.out_edges(node_id)
            .into_iter()
            .find(|e| e.label.is_none())
            .map(|e| e.target)
    }

    /// Returns the target of the node's out-edge with the given branch label.
    #[must_use]
    pub fn branch_target(&self, node_id: NodeId, label: BranchLabel) -> Option<NodeId> {
        self.out_edges(node_id)
            .into_iter()
            .find(|e| e.label == Some(label))
            .map(|e| e.target)
    }

    /// Returns the set of nodes reachable from the given node (inclusive).
    #[must_use]
    pub fn reachable_from(&self, node_id: NodeId) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();

        if self.node_index_map.contains_key(&node_id) {
            seen.insert(node_id);
            queue.push_back(node_id);
        }

        while let Some(current) = queue.pop_front() {
            for edge in self.out_edges(current) {
                if seen.insert(edge.target) {
                    queue.push_back(edge.target);
                }
            }
        }

        seen
    }

    /// Rebuilds the node index map after deserialization.
    pub fn rebuild_index_map(&mut self) {
        self.node_index_map.clear();
        for index in self.graph.node_indices() {
            if let Some(node) = self.graph.node_weight(index) {
                self.node_index_map.insert(node.id, index);
            }
        }
    }
}

impl Default for FlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom serde for petgraph DiGraph.
mod graph_serde {
    use super::*;
    use petgraph::visit::EdgeRef as _;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeStruct;

    pub fn serialize<S>(graph: &DiGraph<Node, Edge>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let nodes: Vec<_> = graph.node_weights().cloned().collect();
        let edges: Vec<_> = graph
            .edge_references()
            .map(|e| {
                let source_id = graph.node_weight(e.source()).map(|n| n.id);
                let target_id = graph.node_weight(e.target()).map(|n| n.id);
                (source_id, target_id, *e.weight())
            })
            .collect();

        let mut state = serializer.serialize_struct("Graph", 2)?;
        state.serialize_field("nodes", &nodes)?;
        state.serialize_field("edges", &edges)?;
        state.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DiGraph<Node, Edge>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        type EdgeTuple = (Option<NodeId>, Option<NodeId>, Edge);

        struct GraphVisitor;

        impl<'de> Visitor<'de> for GraphVisitor {
            type Value = DiGraph<Node, Edge>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a flow graph with nodes and edges")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut nodes: Option<Vec<Node>> = None;
                let mut edges: Option<Vec<EdgeTuple>> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "nodes" => nodes = Some(map.next_value()?),
                        "edges" => edges = Some(map.next_value()?),
                        _ => {
                            let _ = map.next_value::<serde::de::IgnoredAny>()?;
                        }
                    }
                }

                let nodes = nodes.unwrap_or_default();
                let edges = edges.unwrap_or_default();

                let mut graph = DiGraph::new();
                let mut id_to_index = HashMap::new();

                for node in nodes {
                    let id = node.id;
                    let index = graph.add_node(node);
                    id_to_index.insert(id, index);
                }

                for (source_id, target_id, edge) in edges {
                    let (Some(source), Some(target)) = (source_id, target_id) else {
                        continue;
                    };
                    let (Some(&source_idx), Some(&target_idx)) =
                        (id_to_index.get(&source), id_to_index.get(&target))
                    else {
                        continue;
                    };
                    graph.add_edge(source_idx, target_idx, edge);
                }

                Ok(graph)
            }
        }

        deserializer.deserialize_struct("Graph", &["nodes", "edges"], GraphVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeConfig;

    fn trigger(name: &str) -> Node {
        Node::new(name, NodeConfig::Trigger)
    }

    fn message(name: &str) -> Node {
        Node::new(
            name,
            NodeConfig::SendMessage {
                text: "Hi {name}".to_string(),
            },
        )
    }

    fn condition(name: &str) -> Node {
        Node::new(
            name,
            NodeConfig::Condition {
                expression: "{rating} >= 4".to_string(),
            },
        )
    }

    #[test]
    fn add_and_get_node() {
        let mut graph = FlowGraph::new();
        let node = trigger("Start");
        let node_id = node.id;
        graph.add_node(node);

        let retrieved = graph.get_node(node_id);
        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().name, "Start");
    }

    #[test]
    fn add_edge_rejects_missing_node() {
        let mut graph = FlowGraph::new();
        let start = trigger("Start");
        let start_id = start.id;
        graph.add_node(start);

        let result = graph.add_edge(start_id, NodeId::new(), Edge::unlabeled());
        assert!(result.is_err());
    }

    #[test]
    fn next_after_follows_unlabeled_edge() {
        let mut graph = FlowGraph::new();
        let start = trigger("Start");
        let greet = message("Greet");
        let start_id = start.id;
        let greet_id = greet.id;

        graph.add_node(start);
        graph.add_node(greet);
        graph.add_edge(start_id, greet_id, Edge::unlabeled()).unwrap();

        assert_eq!(graph.next_after(start_id), Some(greet_id));
        assert_eq!(graph.next_after(greet_id), None);
    }

    #[test]
    fn branch_target_follows_label() {
        let mut graph = FlowGraph::new();
        let check = condition("Check rating");
        let yes = message("Thanks");
        let no = message("Sorry");
        let check_id = check.id;
        let yes_id = yes.id;
        let no_id = no.id;

        graph.add_node(check);
        graph.add_node(yes);
        graph.add_node(no);
        graph
            .add_edge(check_id, yes_id, Edge::branch(BranchLabel::True))
            .unwrap();
        graph
            .add_edge(check_id, no_id, Edge::branch(BranchLabel::False))
            .unwrap();

        assert_eq!(graph.branch_target(check_id, BranchLabel::True), Some(yes_id));
        assert_eq!(graph.branch_target(check_id, BranchLabel::False), Some(no_id));
        assert_eq!(graph.next_after(check_id), None);
    }

    #[test]
    fn trigger_node_requires_exactly_one() {
        let mut graph = FlowGraph::new();
        assert!(graph.trigger_node().is_none());

        graph.add_node(trigger("A"));
        assert!(graph.trigger_node().is_some());

        graph.add_node(trigger("B"));
        assert!(graph.trigger_node().is_none());
    }

    #[test]
    fn reachable_from_walks_cycles() {
        let mut graph = FlowGraph::new();
        let a = trigger("A");
        let b = message("B");
        let c = condition("C");
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);

        graph.add_node(a);
        graph.add_node(b);
        graph.add_node(c);
        graph.add_edge(a_id, b_id, Edge::unlabeled()).unwrap();
        graph.add_edge(b_id, c_id, Edge::unlabeled()).unwrap();
        // Loop back: condition false retries the message.
        graph
            .add_edge(c_id, b_id, Edge::branch(BranchLabel::False))
            .unwrap();

        let reachable = graph.reachable_from(a_id);
        assert_eq!(reachable.len(), 3);
    }

    #[test]
    fn remove_node_keeps_lookups_valid() {
        let mut graph = FlowGraph::new();
        let a = trigger("A");
        let b = message("B");
        let c = message("C");
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);

        graph.add_node(a);
        graph.add_node(b);
        graph.add_node(c);
        graph.add_edge(a_id, b_id, Edge::unlabeled()).unwrap();
        graph.add_edge(b_id, c_id, Edge::unlabeled()).unwrap();

        graph.remove_node(b_id);

        assert!(graph.get_node(b_id).is_none());
        assert_eq!(graph.get_node(a_id).unwrap().name, "A");
        assert_eq!(graph.get_node(c_id).unwrap().name, "C");
        assert_eq!(graph.next_after(a_id), None);
    }

    #[test]
    fn graph_serde_roundtrip() {
        let mut graph = FlowGraph::new();
        let start = trigger("Start");
        let greet = message("Greet");
        let start_id = start.id;
        let greet_id = greet.id;

        graph.add_node(start);
        graph.add_node(greet);
        graph.add_edge(start_id, greet_id, Edge::unlabeled()).unwrap();

        let json = serde_json::to_string(&graph).expect("serialize");
        let mut parsed: FlowGraph = serde_json::from_str(&json).expect("deserialize");
        parsed.rebuild_index_map();

        assert_eq!(parsed.node_count(), 2);
        assert_eq!(parsed.edge_count(), 1);
        assert_eq!(parsed.next_after(start_id), Some(greet_id));
    }
}
