//! Flow interpreter: the per-run state machine.
//!
//! Given a run in `Running` state, the interpreter executes the cursor node,
//! applies the outcome, and loops until the run suspends, terminates, fails,
//! or hits the step ceiling. Execution of a single run is strictly
//! sequential: each collaborator call is awaited before the cursor advances,
//! and no two node executions of the same run ever overlap.
//!
//! The interpreter is pure with respect to the graph (read-only) and owns
//! all mutation of run state and the variable store.

use crate::automation::Automation;
use crate::collaborator::Collaborators;
use crate::edge::BranchLabel;
use crate::error::FlowError;
use crate::executor::{self, ExecutionOutcome};
use crate::run::{Run, RunStatus};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Execution limits and collaborator call policy.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Maximum node executions per run, across suspensions. Bounds cycles.
    pub max_steps: u32,
    /// Timeout for a single collaborator call.
    pub call_timeout: Duration,
    /// Attempts for idempotent collaborator calls (1 = no retry).
    pub retry_attempts: u32,
    /// Pause between retry attempts.
    pub retry_backoff: Duration,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_steps: 500,
            call_timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// Walks automation graphs, one run at a time.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    config: InterpreterConfig,
}

impl Interpreter {
    /// Creates an interpreter with the given limits.
    #[must_use]
    pub fn new(config: InterpreterConfig) -> Self {
        Self { config }
    }

    /// Returns the configured limits.
    #[must_use]
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Drives a run until it suspends, completes, or fails.
    ///
    /// Re-entering a suspended run resumes at the stored cursor with the
    /// same semantics as a fresh dispatch. Terminal runs are returned
    /// untouched. All failure modes are recorded on the run; this method
    /// never panics or returns an error.
    #[instrument(skip_all, fields(run = %run.id, automation = %automation.id))]
    pub async fn drive(
        &self,
        run: &mut Run,
        automation: &Automation,
        collaborators: &Collaborators,
    ) -> RunStatus {
        if run.status.is_terminal() {
            return run.status;
        }
        if run.status == RunStatus::Suspended {
            run.resume();
        }

        loop {
            let Some(node) = automation.graph.get_node(run.cursor) else {
                // The graph was edited out from under this run.
                let error = FlowError::ResumeTargetMissing {
                    automation_id: automation.id,
                    node_id: run.cursor,
                };
                warn!(%error, "failing run");
                run.fail(error.to_string());
                break;
            };

            if run.steps_taken >= self.config.max_steps {
                let error = FlowError::StepLimitExceeded {
                    limit: self.config.max_steps,
                };
                warn!(%error, "failing run");
                run.fail(error.to_string());
                break;
            }

            run.steps_taken += 1;
            debug!(step = run.steps_taken, node = %node.id, kind = %node.kind(), "executing node");

            let outcome =
                executor::execute_node(node, automation, run, collaborators, &self.config).await;

            match outcome {
                ExecutionOutcome::Continue => match automation.graph.next_after(node.id) {
                    Some(next) => run.cursor = next,
                    None => {
                        debug!(node = %node.id, "no outgoing edge, run complete");
                        run.complete();
                        break;
                    }
                },
                ExecutionOutcome::Branch { taken } => {
                    let label = BranchLabel::from_verdict(taken);
                    let target = automation
                        .graph
                        .branch_target(node.id, label)
                        .or_else(|| automation.graph.next_after(node.id));
                    match target {
                        Some(next) => run.cursor = next,
                        None => {
                            // No edge for the computed branch: this branch of
                            // execution ends gracefully.
                            debug!(node = %node.id, taken, "no edge for branch, run complete");
                            run.complete();
                            break;
                        }
                    }
                }
                ExecutionOutcome::Suspend { resume_at } => {
                    match automation.graph.next_after(node.id) {
                        Some(next) => {
                            run.cursor = next;
                            run.suspend(resume_at);
                            info!(resume_at = %resume_at, "run suspended");
                        }
                        None => {
                            // A delay with nothing after it has nothing to
                            // resume into.
                            run.complete();
                        }
                    }
                    break;
                }
                ExecutionOutcome::Terminate => {
                    run.complete();
                    break;
                }
                ExecutionOutcome::Fail { reason } => {
                    warn!(reason, "node failed, failing run");
                    run.fail(reason);
                    break;
                }
            }
        }

        run.status
    }
}
