//! Automation flow engine for the copper-relay platform.
//!
//! This crate provides the core execution engine for user-authored
//! automations, including:
//!
//! - **Graph Model**: Directed flow graphs using petgraph with typed nodes
//!   and branch-labeled edges; cycles permitted, bounded at run time
//! - **Variable Store**: Per-run scratch space with template substitution
//! - **Condition Evaluator**: Sandboxed, fail-closed expression evaluation
//! - **Action Executors**: One executor per node kind, dispatching to
//!   collaborator traits for side effects
//! - **Flow Interpreter**: State machine advancing a run one node at a time,
//!   with durable suspension at delay nodes

pub mod automation;
pub mod collaborator;
pub mod condition;
pub mod edge;
pub mod error;
pub mod executor;
pub mod graph;
pub mod interpreter;
pub mod node;
pub mod run;
pub mod validate;
pub mod variables;

pub use automation::{Automation, AutomationSummary, BookingStatus, TriggerKind, TriggerSpec};
pub use collaborator::{
    AiCompleter, BookingDesk, ChannelRegistry, ChannelStatus, CollaboratorError, Collaborators,
    ContactTagger, Messenger,
};
pub use condition::{Verdict, evaluate};
pub use edge::{BranchLabel, Edge, EdgeRef};
pub use error::{FlowError, GraphError};
pub use executor::ExecutionOutcome;
pub use graph::FlowGraph;
pub use interpreter::{Interpreter, InterpreterConfig};
pub use node::{DelayUnit, Node, NodeConfig, NodeId, NodeKind, Position};
pub use run::{Run, RunStatus, TriggerContext};
pub use validate::{Severity, ValidationIssue, ValidationReport, validate_graph};
pub use variables::{LAST_AI_RESPONSE, VariableStore};
