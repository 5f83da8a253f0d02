//! The run scheduler: admission, timed resumption, cancellation.
//!
//! The scheduler is the only component that creates runs and the only one
//! that re-enters suspended runs. Admission deduplicates repeat event
//! deliveries through the run store; resumption claims each due run exactly
//! once per tick cycle, so concurrent or duplicate ticks cannot double-drive
//! a run. One run's failure never blocks the rest of a tick.

use crate::config::{EngineConfig, SuspendedRunPolicy};
use crate::error::SchedulerError;
use crate::event::TriggerEvent;
use crate::matcher;
use crate::store::{AutomationStore, RunStore, StoreError};
use chrono::{DateTime, Utc};
use copper_relay_core::{AutomationId, RunId};
use copper_relay_flow::collaborator::Collaborators;
use copper_relay_flow::interpreter::Interpreter;
use copper_relay_flow::run::Run;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// The result of asking the scheduler to admit a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A run was created and driven to its first suspension or terminal
    /// state.
    Started(RunId),
    /// A run for this (automation, event) was already admitted.
    Deduplicated,
    /// The automation cannot run (inactive, unbound, or malformed graph).
    Refused { reason: String },
}

/// Counters from one tick cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Due runs claimed this tick.
    pub claimed: usize,
    /// Claimed runs driven by the interpreter.
    pub resumed: usize,
    /// Claimed runs cancelled by policy instead of resumed.
    pub cancelled: usize,
}

enum Resumption {
    Resumed,
    Cancelled,
}

/// Owns pending and resumable runs.
pub struct RunScheduler<A, R> {
    automations: Arc<A>,
    runs: Arc<R>,
    collaborators: Collaborators,
    interpreter: Interpreter,
    claim_batch_size: usize,
    on_deactivate: SuspendedRunPolicy,
}

impl<A, R> RunScheduler<A, R>
where
    A: AutomationStore,
    R: RunStore,
{
    /// Creates a scheduler over the given stores and collaborators.
    pub fn new(
        automations: Arc<A>,
        runs: Arc<R>,
        collaborators: Collaborators,
        config: &EngineConfig,
    ) -> Self {
        Self {
            automations,
            runs,
            collaborators,
            interpreter: Interpreter::new(config.interpreter_config()),
            claim_batch_size: config.claim_batch_size,
            on_deactivate: config.on_deactivate,
        }
    }

    /// Matches an event against active automations and admits a run per
    /// match. Returns the admission outcome per matched automation.
    pub async fn on_event(
        &self,
        event: &TriggerEvent,
    ) -> Result<Vec<(AutomationId, Admission)>, SchedulerError> {
        let active = self.automations.list_active().await?;
        let matched = matcher::match_event(event, active.iter());

        let mut admissions = Vec::with_capacity(matched.len());
        for automation_id in matched {
            let admission = self.admit(automation_id, event).await?;
            admissions.push((automation_id, admission));
        }
        Ok(admissions)
    }

    /// Admits a run of one automation for an event and drives it to its
    /// first suspension or terminal state.
    ///
    /// # Errors
    ///
    /// Returns an error if the automation does not exist or a store
    /// operation fails. An automation that exists but cannot run yields
    /// [`Admission::Refused`], not an error.
    #[instrument(skip(self, event), fields(automation = %automation_id))]
    pub async fn admit(
        &self,
        automation_id: AutomationId,
        event: &TriggerEvent,
    ) -> Result<Admission, SchedulerError> {
        let Some(automation) = self.automations.get(automation_id).await? else {
            return Err(SchedulerError::AutomationNotFound { id: automation_id });
        };

        if !automation.is_active {
            return Ok(Admission::Refused {
                reason: "automation is deactivated".to_string(),
            });
        }
        if automation.channel_id.is_none() {
            return Ok(Admission::Refused {
                reason: "automation has no bound channel".to_string(),
            });
        }
        let Some(entry) = automation.graph.trigger_node() else {
            return Ok(Admission::Refused {
                reason: "graph has no trigger node".to_string(),
            });
        };

        let mut run = Run::new(automation_id, entry.id, event.context());
        let run_id = run.id;
        let dedup_key = format!("{automation_id}:{}", event.dedup_key());

        if !self.runs.insert(run.clone(), dedup_key).await? {
            info!(event = %event.event_id(), "event already admitted, deduplicated");
            return Ok(Admission::Deduplicated);
        }
        self.automations.record_run(automation_id).await?;

        self.interpreter
            .drive(&mut run, &automation, &self.collaborators)
            .await;
        self.runs.update(&run).await?;

        info!(run = %run_id, status = ?run.status, "run admitted");
        Ok(Admission::Started(run_id))
    }

    /// Resumes every due suspended run exactly once.
    ///
    /// Failures while resuming one run are logged and do not affect the
    /// others.
    #[instrument(skip(self))]
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary, SchedulerError> {
        let claimed = self.runs.claim_due(now, self.claim_batch_size).await?;
        let mut summary = TickSummary {
            claimed: claimed.len(),
            ..TickSummary::default()
        };

        for mut run in claimed {
            match self.resume_one(&mut run).await {
                Ok(Resumption::Resumed) => summary.resumed += 1,
                Ok(Resumption::Cancelled) => summary.cancelled += 1,
                Err(error) => {
                    warn!(run = %run.id, %error, "failed to resume run");
                }
            }
        }

        Ok(summary)
    }

    async fn resume_one(&self, run: &mut Run) -> Result<Resumption, StoreError> {
        let automation = self.automations.get(run.automation_id).await?;

        let automation = match automation {
            None => {
                run.fail("automation no longer exists");
                self.runs.update(run).await?;
                return Ok(Resumption::Cancelled);
            }
            Some(automation) => automation,
        };

        if !automation.is_active && self.on_deactivate == SuspendedRunPolicy::Cancel {
            run.fail("automation deactivated");
            self.runs.update(run).await?;
            return Ok(Resumption::Cancelled);
        }

        self.interpreter
            .drive(run, &automation, &self.collaborators)
            .await;
        self.runs.update(run).await?;
        Ok(Resumption::Resumed)
    }

    /// Cancels a run. Returns true if the run existed and was not yet
    /// terminal.
    pub async fn cancel(&self, run_id: RunId) -> Result<bool, SchedulerError> {
        let Some(mut run) = self.runs.get(run_id).await? else {
            return Ok(false);
        };
        if run.status.is_terminal() {
            return Ok(false);
        }

        run.fail("cancelled by operator");
        self.runs.update(&run).await?;
        info!(run = %run_id, "run cancelled");
        Ok(true)
    }

    /// Applies the configured suspended-run policy after an automation was
    /// deactivated. Returns the number of runs cancelled (zero under the
    /// drain policy).
    pub async fn handle_deactivation(
        &self,
        automation_id: AutomationId,
    ) -> Result<usize, SchedulerError> {
        match self.on_deactivate {
            SuspendedRunPolicy::Cancel => self.cancel_suspended_for(automation_id).await,
            SuspendedRunPolicy::Drain => Ok(0),
        }
    }

    /// Cancels every suspended run of an automation. Returns the number of
    /// runs cancelled.
    pub async fn cancel_suspended_for(
        &self,
        automation_id: AutomationId,
    ) -> Result<usize, SchedulerError> {
        let suspended = self.runs.suspended_for_automation(automation_id).await?;
        let count = suspended.len();

        for mut run in suspended {
            run.fail("automation deactivated");
            self.runs.update(&run).await?;
        }

        if count > 0 {
            info!(automation = %automation_id, count, "cancelled suspended runs");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryAutomationStore, MemoryRunStore};
    use async_trait::async_trait;
    use chrono::Duration;
    use copper_relay_core::{ChannelId, ContactId, ConversationId, EventId};
    use copper_relay_flow::automation::{Automation, TriggerSpec};
    use copper_relay_flow::collaborator::{
        AiCompleter, AiCompletion, AiRequest, BookingConfirmation, BookingDesk, BookingRequest,
        ChannelRegistry, ChannelStatus, CollaboratorError, ContactTagger, DeliveryReceipt,
        Messenger, OutgoingMessage,
    };
    use copper_relay_flow::edge::Edge;
    use copper_relay_flow::node::{DelayUnit, Node, NodeConfig};
    use copper_relay_flow::run::RunStatus;
    use std::sync::Mutex;

    struct CountingMessenger {
        sent: Mutex<Vec<OutgoingMessage>>,
    }

    #[async_trait]
    impl Messenger for CountingMessenger {
        async fn send(
            &self,
            message: OutgoingMessage,
        ) -> Result<DeliveryReceipt, CollaboratorError> {
            self.sent.lock().unwrap().push(message);
            Ok(DeliveryReceipt::default())
        }
    }

    struct NullAi;

    #[async_trait]
    impl AiCompleter for NullAi {
        async fn complete(&self, _request: AiRequest) -> Result<AiCompletion, CollaboratorError> {
            Ok(AiCompletion {
                text: "ok".to_string(),
            })
        }
    }

    struct NullBookings;

    #[async_trait]
    impl BookingDesk for NullBookings {
        async fn create(
            &self,
            _request: BookingRequest,
        ) -> Result<BookingConfirmation, CollaboratorError> {
            Ok(BookingConfirmation {
                booking_id: copper_relay_core::BookingId::new(),
            })
        }
    }

    struct NullTagger;

    #[async_trait]
    impl ContactTagger for NullTagger {
        async fn tag(&self, _contact_id: ContactId, _tag: &str) -> Result<(), CollaboratorError> {
            Ok(())
        }
    }

    struct AlwaysConnected;

    #[async_trait]
    impl ChannelRegistry for AlwaysConnected {
        async fn status(&self, _channel_id: ChannelId) -> Result<ChannelStatus, CollaboratorError> {
            Ok(ChannelStatus::Connected)
        }
    }

    struct Fixture {
        automations: Arc<MemoryAutomationStore>,
        runs: Arc<MemoryRunStore>,
        messenger: Arc<CountingMessenger>,
        scheduler: RunScheduler<MemoryAutomationStore, MemoryRunStore>,
    }

    impl Fixture {
        fn new(config: EngineConfig) -> Self {
            let automations = Arc::new(MemoryAutomationStore::new());
            let runs = Arc::new(MemoryRunStore::new());
            let messenger = Arc::new(CountingMessenger {
                sent: Mutex::new(Vec::new()),
            });
            let collaborators = Collaborators {
                messenger: messenger.clone(),
                ai: Arc::new(NullAi),
                bookings: Arc::new(NullBookings),
                tagger: Arc::new(NullTagger),
                channels: Arc::new(AlwaysConnected),
            };
            let scheduler =
                RunScheduler::new(automations.clone(), runs.clone(), collaborators, &config);
            Self {
                automations,
                runs,
                messenger,
                scheduler,
            }
        }

        fn sent_count(&self) -> usize {
            self.messenger.sent.lock().unwrap().len()
        }
    }

    fn keyword_automation(channel_id: ChannelId, with_delay: bool) -> Automation {
        let mut automation = Automation::new(
            "Booking helper",
            TriggerSpec::Keyword {
                keywords: vec!["book".to_string()],
            },
        )
        .with_channel(channel_id);

        let trigger = automation.graph.add_node(Node::new("Start", NodeConfig::Trigger));
        let mut tail = trigger;
        if with_delay {
            let delay = automation.graph.add_node(Node::new(
                "Wait",
                NodeConfig::Delay {
                    amount: 10,
                    unit: DelayUnit::Minutes,
                },
            ));
            automation.graph.add_edge(tail, delay, Edge::unlabeled()).unwrap();
            tail = delay;
        }
        let send = automation.graph.add_node(Node::new(
            "Offer",
            NodeConfig::SendMessage {
                text: "Hi {name}, want to book?".to_string(),
            },
        ));
        let done = automation.graph.add_node(Node::new("End", NodeConfig::EndFlow));
        automation.graph.add_edge(tail, send, Edge::unlabeled()).unwrap();
        automation.graph.add_edge(send, done, Edge::unlabeled()).unwrap();
        automation
    }

    fn message_event(channel_id: ChannelId, text: &str) -> TriggerEvent {
        TriggerEvent::MessageReceived {
            event_id: EventId::new(),
            channel_id,
            conversation_id: ConversationId::new(),
            contact_id: ContactId::new(),
            contact_name: Some("Sara".to_string()),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn on_event_admits_and_executes_matching_automation() {
        let fixture = Fixture::new(EngineConfig::default());
        let channel_id = ChannelId::new();
        let automation = keyword_automation(channel_id, false);
        let automation_id = automation.id;
        fixture.automations.put(automation).await.unwrap();

        let admissions = fixture
            .scheduler
            .on_event(&message_event(channel_id, "I want to book"))
            .await
            .unwrap();

        assert_eq!(admissions.len(), 1);
        let (admitted_id, admission) = &admissions[0];
        assert_eq!(*admitted_id, automation_id);
        let Admission::Started(run_id) = admission else {
            panic!("expected Started, got {admission:?}");
        };

        let run = fixture.runs.get(*run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(fixture.sent_count(), 1);
        assert_eq!(
            fixture
                .automations
                .get(automation_id)
                .await
                .unwrap()
                .unwrap()
                .run_count,
            1
        );
    }

    #[tokio::test]
    async fn duplicate_event_admits_one_run() {
        let fixture = Fixture::new(EngineConfig::default());
        let channel_id = ChannelId::new();
        let automation = keyword_automation(channel_id, false);
        let automation_id = automation.id;
        fixture.automations.put(automation).await.unwrap();

        let event = message_event(channel_id, "book me");

        let first = fixture.scheduler.admit(automation_id, &event).await.unwrap();
        let second = fixture.scheduler.admit(automation_id, &event).await.unwrap();

        assert!(matches!(first, Admission::Started(_)));
        assert_eq!(second, Admission::Deduplicated);
        assert_eq!(fixture.sent_count(), 1);
        assert_eq!(
            fixture
                .automations
                .get(automation_id)
                .await
                .unwrap()
                .unwrap()
                .run_count,
            1
        );
    }

    #[tokio::test]
    async fn redelivered_conversation_event_admits_one_run() {
        let fixture = Fixture::new(EngineConfig::default());
        let channel_id = ChannelId::new();
        let mut automation =
            Automation::new("Welcome", TriggerSpec::NewConversation).with_channel(channel_id);
        let trigger = automation.graph.add_node(Node::new("Start", NodeConfig::Trigger));
        let done = automation.graph.add_node(Node::new("End", NodeConfig::EndFlow));
        automation.graph.add_edge(trigger, done, Edge::unlabeled()).unwrap();
        fixture.automations.put(automation).await.unwrap();

        let conversation_id = ConversationId::new();
        let contact_id = ContactId::new();
        let delivery = |event_id| TriggerEvent::ConversationStarted {
            event_id,
            channel_id,
            conversation_id,
            contact_id,
            contact_name: None,
        };

        // A webhook retry carries a fresh delivery id for the same conversation.
        let first = fixture.scheduler.on_event(&delivery(EventId::new())).await.unwrap();
        let second = fixture.scheduler.on_event(&delivery(EventId::new())).await.unwrap();

        assert!(matches!(first[0].1, Admission::Started(_)));
        assert_eq!(second[0].1, Admission::Deduplicated);
    }

    #[tokio::test]
    async fn admit_refuses_deactivated_automation() {
        let fixture = Fixture::new(EngineConfig::default());
        let channel_id = ChannelId::new();
        let mut automation = keyword_automation(channel_id, false);
        automation.deactivate();
        let automation_id = automation.id;
        fixture.automations.put(automation).await.unwrap();

        let admission = fixture
            .scheduler
            .admit(automation_id, &message_event(channel_id, "book"))
            .await
            .unwrap();

        assert!(matches!(admission, Admission::Refused { .. }));
        assert_eq!(fixture.sent_count(), 0);
    }

    #[tokio::test]
    async fn tick_resumes_due_run_exactly_once() {
        let fixture = Fixture::new(EngineConfig::default());
        let channel_id = ChannelId::new();
        let automation = keyword_automation(channel_id, true);
        let automation_id = automation.id;
        fixture.automations.put(automation).await.unwrap();

        let admission = fixture
            .scheduler
            .admit(automation_id, &message_event(channel_id, "book"))
            .await
            .unwrap();
        let Admission::Started(run_id) = admission else {
            panic!("expected Started");
        };
        assert_eq!(
            fixture.runs.get(run_id).await.unwrap().unwrap().status,
            RunStatus::Suspended
        );
        assert_eq!(fixture.sent_count(), 0);

        let due = Utc::now() + Duration::minutes(10);
        let first = fixture.scheduler.tick(due).await.unwrap();
        let second = fixture.scheduler.tick(due).await.unwrap();

        assert_eq!(first.claimed, 1);
        assert_eq!(first.resumed, 1);
        assert_eq!(second.claimed, 0);
        assert_eq!(fixture.sent_count(), 1);
        assert_eq!(
            fixture.runs.get(run_id).await.unwrap().unwrap().status,
            RunStatus::Completed
        );
    }

    #[tokio::test]
    async fn concurrent_ticks_resume_once() {
        let fixture = Fixture::new(EngineConfig::default());
        let channel_id = ChannelId::new();
        let automation = keyword_automation(channel_id, true);
        let automation_id = automation.id;
        fixture.automations.put(automation).await.unwrap();

        fixture
            .scheduler
            .admit(automation_id, &message_event(channel_id, "book"))
            .await
            .unwrap();

        let due = Utc::now() + Duration::minutes(10);
        let (a, b) = tokio::join!(fixture.scheduler.tick(due), fixture.scheduler.tick(due));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.resumed + b.resumed, 1);
        assert_eq!(fixture.sent_count(), 1);
    }

    #[tokio::test]
    async fn tick_before_due_time_does_nothing() {
        let fixture = Fixture::new(EngineConfig::default());
        let channel_id = ChannelId::new();
        let automation = keyword_automation(channel_id, true);
        let automation_id = automation.id;
        fixture.automations.put(automation).await.unwrap();

        fixture
            .scheduler
            .admit(automation_id, &message_event(channel_id, "book"))
            .await
            .unwrap();

        let summary = fixture.scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(summary.claimed, 0);
        assert_eq!(fixture.sent_count(), 0);
    }

    #[tokio::test]
    async fn deactivation_cancels_suspended_run_under_cancel_policy() {
        let fixture = Fixture::new(EngineConfig::default());
        let channel_id = ChannelId::new();
        let automation = keyword_automation(channel_id, true);
        let automation_id = automation.id;
        fixture.automations.put(automation.clone()).await.unwrap();

        let Admission::Started(run_id) = fixture
            .scheduler
            .admit(automation_id, &message_event(channel_id, "book"))
            .await
            .unwrap()
        else {
            panic!("expected Started");
        };

        let mut deactivated = automation;
        deactivated.deactivate();
        fixture.automations.put(deactivated).await.unwrap();

        let due = Utc::now() + Duration::minutes(10);
        let summary = fixture.scheduler.tick(due).await.unwrap();

        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.resumed, 0);
        let run = fixture.runs.get(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.failure.unwrap().contains("deactivated"));
        assert_eq!(fixture.sent_count(), 0);
    }

    #[tokio::test]
    async fn drain_policy_resumes_suspended_run_of_deactivated_automation() {
        let config = EngineConfig {
            on_deactivate: SuspendedRunPolicy::Drain,
            ..EngineConfig::default()
        };
        let fixture = Fixture::new(config);
        let channel_id = ChannelId::new();
        let automation = keyword_automation(channel_id, true);
        let automation_id = automation.id;
        fixture.automations.put(automation.clone()).await.unwrap();

        fixture
            .scheduler
            .admit(automation_id, &message_event(channel_id, "book"))
            .await
            .unwrap();

        let mut deactivated = automation;
        deactivated.deactivate();
        fixture.automations.put(deactivated).await.unwrap();

        let due = Utc::now() + Duration::minutes(10);
        let summary = fixture.scheduler.tick(due).await.unwrap();

        assert_eq!(summary.resumed, 1);
        assert_eq!(fixture.sent_count(), 1);
    }

    #[tokio::test]
    async fn cancel_stops_a_suspended_run() {
        let fixture = Fixture::new(EngineConfig::default());
        let channel_id = ChannelId::new();
        let automation = keyword_automation(channel_id, true);
        let automation_id = automation.id;
        fixture.automations.put(automation).await.unwrap();

        let Admission::Started(run_id) = fixture
            .scheduler
            .admit(automation_id, &message_event(channel_id, "book"))
            .await
            .unwrap()
        else {
            panic!("expected Started");
        };

        assert!(fixture.scheduler.cancel(run_id).await.unwrap());
        // Already terminal: a second cancel is a no-op.
        assert!(!fixture.scheduler.cancel(run_id).await.unwrap());

        let due = Utc::now() + Duration::minutes(10);
        let summary = fixture.scheduler.tick(due).await.unwrap();
        assert_eq!(summary.claimed, 0);
        assert_eq!(fixture.sent_count(), 0);
    }

    #[tokio::test]
    async fn one_runs_failure_does_not_block_others() {
        let fixture = Fixture::new(EngineConfig::default());
        let channel_a = ChannelId::new();
        let channel_b = ChannelId::new();
        let doomed = keyword_automation(channel_a, true);
        let healthy = keyword_automation(channel_b, true);
        let doomed_id = doomed.id;
        let healthy_id = healthy.id;
        fixture.automations.put(doomed).await.unwrap();
        fixture.automations.put(healthy).await.unwrap();

        fixture
            .scheduler
            .admit(doomed_id, &message_event(channel_a, "book"))
            .await
            .unwrap();
        fixture
            .scheduler
            .admit(healthy_id, &message_event(channel_b, "book"))
            .await
            .unwrap();

        // The doomed automation disappears while its run is suspended.
        fixture.automations.remove(doomed_id).await.unwrap();

        let due = Utc::now() + Duration::minutes(10);
        let summary = fixture.scheduler.tick(due).await.unwrap();

        assert_eq!(summary.claimed, 2);
        assert_eq!(summary.resumed, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(fixture.sent_count(), 1);

        let doomed_runs = fixture.runs.list_for_automation(doomed_id).await.unwrap();
        assert_eq!(doomed_runs[0].status, RunStatus::Failed);
        let healthy_runs = fixture.runs.list_for_automation(healthy_id).await.unwrap();
        assert_eq!(healthy_runs[0].status, RunStatus::Completed);
    }
}
