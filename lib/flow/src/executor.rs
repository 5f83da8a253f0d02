//! Action executors, one per node kind.
//!
//! Every executor shares one contract: given the node, the run, and the
//! collaborator set, perform the node's side effect and report how the run
//! proceeds. Collaborator calls are bounded by the configured timeout;
//! idempotent calls (message send, booking creation, AI completion) are
//! retried on transient failure with bounded backoff, keyed by a
//! client-generated dedup key so a retry cannot double-apply.

use crate::automation::Automation;
use crate::collaborator::{
    AiRequest, BookingRequest, ChannelStatus, CollaboratorError, Collaborators, OutgoingMessage,
};
use crate::condition;
use crate::interpreter::InterpreterConfig;
use crate::node::{Node, NodeConfig};
use crate::run::Run;
use crate::variables::LAST_AI_RESPONSE;
use chrono::{DateTime, Utc};
use std::future::Future;
use tracing::{debug, warn};

/// How the run proceeds after a node executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Advance via the node's single unlabeled out-edge.
    Continue,
    /// Advance via the branch edge chosen by the condition evaluator.
    Branch { taken: bool },
    /// Suspend the run; the scheduler resumes it once `resume_at` is due.
    Suspend { resume_at: DateTime<Utc> },
    /// The run reached a terminal node.
    Terminate,
    /// The node's side effect failed; the run fails with this reason.
    Fail { reason: String },
}

impl ExecutionOutcome {
    fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
        }
    }
}

/// Executes a single node, dispatching on its configuration.
///
/// The match is exhaustive over the closed set of node kinds.
pub(crate) async fn execute_node(
    node: &Node,
    automation: &Automation,
    run: &mut Run,
    collaborators: &Collaborators,
    config: &InterpreterConfig,
) -> ExecutionOutcome {
    match &node.config {
        // The trigger exists purely as the fixed entry point.
        NodeConfig::Trigger => ExecutionOutcome::Continue,

        NodeConfig::SendMessage { text } => {
            send_message(text, automation, run, collaborators, config).await
        }

        NodeConfig::AiStep { prompt } => ai_step(prompt, run, collaborators, config).await,

        NodeConfig::Condition { expression } => {
            let verdict = condition::evaluate(expression, &run.variables);
            if let Some(diagnostic) = &verdict.diagnostic {
                warn!(
                    node = %node.id,
                    expression,
                    diagnostic,
                    "condition failed closed"
                );
            }
            ExecutionOutcome::Branch {
                taken: verdict.holds,
            }
        }

        NodeConfig::Delay { amount, unit } => ExecutionOutcome::Suspend {
            resume_at: Utc::now() + unit.duration(*amount),
        },

        NodeConfig::CreateBooking { service } => {
            create_booking(service.as_deref(), run, collaborators, config).await
        }

        NodeConfig::SetVariable { name, value } => {
            let resolved = run.variables.resolve_template(value);
            run.variables.set(name.clone(), resolved);
            ExecutionOutcome::Continue
        }

        NodeConfig::TagUser { tag } => tag_user(tag, run, collaborators, config).await,

        NodeConfig::EndFlow => ExecutionOutcome::Terminate,
    }
}

async fn send_message(
    text: &str,
    automation: &Automation,
    run: &mut Run,
    collaborators: &Collaborators,
    config: &InterpreterConfig,
) -> ExecutionOutcome {
    let Some(channel_id) = automation.channel_id else {
        return ExecutionOutcome::fail("no channel bound to automation");
    };
    let Some(contact_id) = run.context.contact_id else {
        return ExecutionOutcome::fail("no contact in trigger context");
    };

    match once_with_timeout(config, collaborators.channels.status(channel_id)).await {
        Ok(ChannelStatus::Connected) => {}
        Ok(status) => {
            return ExecutionOutcome::fail(format!("channel {channel_id} is {status}"));
        }
        Err(err) => {
            return ExecutionOutcome::fail(format!("channel status check failed: {err}"));
        }
    }

    let message = OutgoingMessage {
        channel_id,
        contact_id,
        text: run.variables.resolve_template(text),
        dedup_key: step_key(run),
    };

    match with_retry(config, || collaborators.messenger.send(message.clone())).await {
        Ok(receipt) => {
            debug!(run = %run.id, provider_ref = ?receipt.provider_ref, "message delivered");
            ExecutionOutcome::Continue
        }
        Err(err) => ExecutionOutcome::fail(format!("message delivery failed: {err}")),
    }
}

async fn ai_step(
    prompt: &str,
    run: &mut Run,
    collaborators: &Collaborators,
    config: &InterpreterConfig,
) -> ExecutionOutcome {
    let request = AiRequest {
        prompt: run.variables.resolve_template(prompt),
        conversation_id: run.context.conversation_id,
    };

    match with_retry(config, || collaborators.ai.complete(request.clone())).await {
        Ok(completion) => {
            run.variables.set(LAST_AI_RESPONSE, completion.text);
            ExecutionOutcome::Continue
        }
        Err(err) => ExecutionOutcome::fail(format!("ai completion failed: {err}")),
    }
}

async fn create_booking(
    service: Option<&str>,
    run: &mut Run,
    collaborators: &Collaborators,
    config: &InterpreterConfig,
) -> ExecutionOutcome {
    let service = service
        .map(str::to_owned)
        .or_else(|| run.context.service_name.clone());
    let Some(service) = service else {
        return ExecutionOutcome::fail("no service reference for booking");
    };
    let Some(contact_id) = run.context.contact_id else {
        return ExecutionOutcome::fail("no contact in trigger context");
    };

    let request = BookingRequest {
        service,
        contact_id,
        requested_time: run.context.requested_time,
        dedup_key: step_key(run),
    };

    match with_retry(config, || collaborators.bookings.create(request.clone())).await {
        Ok(confirmation) => {
            debug!(run = %run.id, booking = %confirmation.booking_id, "booking created");
            ExecutionOutcome::Continue
        }
        Err(err) => ExecutionOutcome::fail(format!("booking creation failed: {err}")),
    }
}

async fn tag_user(
    tag: &str,
    run: &mut Run,
    collaborators: &Collaborators,
    config: &InterpreterConfig,
) -> ExecutionOutcome {
    // Best-effort: a missing contact or tagging failure never fails the run.
    let Some(contact_id) = run.context.contact_id else {
        warn!(run = %run.id, tag, "skipping tag, no contact in trigger context");
        return ExecutionOutcome::Continue;
    };

    if let Err(err) = once_with_timeout(config, collaborators.tagger.tag(contact_id, tag)).await {
        warn!(run = %run.id, tag, error = %err, "tagging failed");
    }

    ExecutionOutcome::Continue
}

/// Dedup key for the side effect of the step currently executing. Stable if
/// the same step is re-executed, distinct across steps of the same run.
fn step_key(run: &Run) -> String {
    format!("{}:{}", run.id, run.steps_taken)
}

async fn once_with_timeout<T>(
    config: &InterpreterConfig,
    call: impl Future<Output = Result<T, CollaboratorError>>,
) -> Result<T, CollaboratorError> {
    match tokio::time::timeout(config.call_timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout),
    }
}

async fn with_retry<T, Fut>(
    config: &InterpreterConfig,
    mut call: impl FnMut() -> Fut,
) -> Result<T, CollaboratorError>
where
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    let attempts = config.retry_attempts.max(1);
    let mut attempt = 1;
    loop {
        match once_with_timeout(config, call()).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                debug!(attempt, error = %err, "transient collaborator failure, retrying");
                tokio::time::sleep(config.retry_backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
