//! Trigger events consumed from external systems.
//!
//! Each inbound event carries the references it naturally has plus a
//! delivery identifier. The dedup key derived here is what guarantees
//! exactly one run per (automation, event) even when the upstream webhook
//! redelivers.

use chrono::{DateTime, Utc};
use copper_relay_core::{BookingId, ChannelId, ContactId, ConversationId, EventId};
use copper_relay_flow::automation::BookingStatus;
use copper_relay_flow::run::TriggerContext;
use serde::{Deserialize, Serialize};

/// An external event that may admit automation runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEvent {
    /// A new conversation started on a channel.
    ConversationStarted {
        event_id: EventId,
        channel_id: ChannelId,
        conversation_id: ConversationId,
        contact_id: ContactId,
        contact_name: Option<String>,
    },
    /// An inbound message arrived in a conversation.
    MessageReceived {
        event_id: EventId,
        channel_id: ChannelId,
        conversation_id: ConversationId,
        contact_id: ContactId,
        contact_name: Option<String>,
        text: String,
    },
    /// A booking was created.
    BookingCreated {
        event_id: EventId,
        booking_id: BookingId,
        contact_id: ContactId,
        contact_name: Option<String>,
        service_name: Option<String>,
        starts_at: Option<DateTime<Utc>>,
    },
    /// A booking changed status.
    BookingStatusChanged {
        event_id: EventId,
        booking_id: BookingId,
        contact_id: ContactId,
        contact_name: Option<String>,
        service_name: Option<String>,
        starts_at: Option<DateTime<Utc>>,
        status: BookingStatus,
    },
    /// Explicit invocation by an operator or the API layer. Never matched
    /// automatically.
    Manual {
        event_id: EventId,
        channel_id: Option<ChannelId>,
        conversation_id: Option<ConversationId>,
        contact_id: Option<ContactId>,
        contact_name: Option<String>,
    },
}

impl TriggerEvent {
    /// Returns the delivery identifier of this event.
    #[must_use]
    pub fn event_id(&self) -> EventId {
        match self {
            Self::ConversationStarted { event_id, .. }
            | Self::MessageReceived { event_id, .. }
            | Self::BookingCreated { event_id, .. }
            | Self::BookingStatusChanged { event_id, .. }
            | Self::Manual { event_id, .. } => *event_id,
        }
    }

    /// Returns the key used to deduplicate repeat deliveries.
    ///
    /// Conversation starts dedup on the conversation and booking events on
    /// the booking, so a redelivered webhook with a fresh delivery id still
    /// admits at most one run per automation.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        match self {
            Self::ConversationStarted {
                conversation_id, ..
            } => format!("conversation:{conversation_id}"),
            Self::MessageReceived { event_id, .. } => format!("message:{event_id}"),
            Self::BookingCreated { booking_id, .. } => {
                format!("booking_created:{booking_id}")
            }
            Self::BookingStatusChanged {
                booking_id, status, ..
            } => format!("booking_status:{booking_id}:{status}"),
            Self::Manual { event_id, .. } => format!("manual:{event_id}"),
        }
    }

    /// Builds the trigger context used to seed a run admitted by this event.
    #[must_use]
    pub fn context(&self) -> TriggerContext {
        match self {
            Self::ConversationStarted {
                event_id,
                channel_id,
                conversation_id,
                contact_id,
                contact_name,
            } => TriggerContext {
                event_id: Some(*event_id),
                channel_id: Some(*channel_id),
                conversation_id: Some(*conversation_id),
                contact_id: Some(*contact_id),
                contact_name: contact_name.clone(),
                ..TriggerContext::default()
            },
            Self::MessageReceived {
                event_id,
                channel_id,
                conversation_id,
                contact_id,
                contact_name,
                text,
            } => TriggerContext {
                event_id: Some(*event_id),
                channel_id: Some(*channel_id),
                conversation_id: Some(*conversation_id),
                contact_id: Some(*contact_id),
                contact_name: contact_name.clone(),
                message_text: Some(text.clone()),
                ..TriggerContext::default()
            },
            Self::BookingCreated {
                event_id,
                booking_id,
                contact_id,
                contact_name,
                service_name,
                starts_at,
            }
            | Self::BookingStatusChanged {
                event_id,
                booking_id,
                contact_id,
                contact_name,
                service_name,
                starts_at,
                ..
            } => TriggerContext {
                event_id: Some(*event_id),
                booking_id: Some(*booking_id),
                contact_id: Some(*contact_id),
                contact_name: contact_name.clone(),
                service_name: service_name.clone(),
                booking_date: starts_at.map(|at| at.format("%Y-%m-%d").to_string()),
                booking_time: starts_at.map(|at| at.format("%H:%M").to_string()),
                requested_time: *starts_at,
                ..TriggerContext::default()
            },
            Self::Manual {
                event_id,
                channel_id,
                conversation_id,
                contact_id,
                contact_name,
            } => TriggerContext {
                event_id: Some(*event_id),
                channel_id: *channel_id,
                conversation_id: *conversation_id,
                contact_id: *contact_id,
                contact_name: contact_name.clone(),
                ..TriggerContext::default()
            },
        }
    }
}
