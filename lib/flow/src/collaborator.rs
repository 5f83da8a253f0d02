//! Collaborator interfaces for external side effects.
//!
//! The engine never talks to a messaging provider, LLM, or booking backend
//! directly; executors go through these traits so the engine stays testable
//! and the integrations live elsewhere. Idempotent operations (message send,
//! booking creation) carry a client-generated dedup key so transient-failure
//! retries cannot double-apply.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use copper_relay_core::{BookingId, ChannelId, ContactId, ConversationId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An outbound message for the messaging collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Channel to deliver on.
    pub channel_id: ChannelId,
    /// Recipient contact.
    pub contact_id: ContactId,
    /// Fully resolved message text.
    pub text: String,
    /// Client-generated key identifying this send across retries.
    pub dedup_key: String,
}

/// Acknowledgement of a delivered message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Provider-side message reference, if the channel reports one.
    pub provider_ref: Option<String>,
}

/// A request to the AI collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiRequest {
    /// Fully resolved prompt text.
    pub prompt: String,
    /// Conversation the run belongs to, for provider-side context.
    pub conversation_id: Option<ConversationId>,
}

/// A completion returned by the AI collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiCompletion {
    /// The generated text.
    pub text: String,
}

/// A request to the booking collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Service to book, by display name.
    pub service: String,
    /// Customer to book for.
    pub contact_id: ContactId,
    /// Requested start time, when the event context carries one.
    pub requested_time: Option<DateTime<Utc>>,
    /// Client-generated key identifying this booking across retries.
    pub dedup_key: String,
}

/// Confirmation of a created booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfirmation {
    /// The created booking.
    pub booking_id: BookingId,
}

/// Connection health of a messaging channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Credentials valid, deliveries accepted.
    Connected,
    /// Credentials expired; the channel needs reconnection.
    Expired,
    /// The channel is in an error state.
    Error,
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Expired => write!(f, "expired"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Errors returned by collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// Permanent rejection (bad recipient, revoked channel, policy).
    Rejected { reason: String },
    /// Transient failure; safe to retry idempotent calls.
    Unavailable { reason: String },
    /// Booking slot conflict. Permanent for the requested time.
    Conflict { reason: String },
    /// The bounded call timeout elapsed.
    Timeout,
}

impl CollaboratorError {
    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout)
    }
}

impl std::fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected { reason } => write!(f, "rejected: {reason}"),
            Self::Unavailable { reason } => write!(f, "unavailable: {reason}"),
            Self::Conflict { reason } => write!(f, "conflict: {reason}"),
            Self::Timeout => write!(f, "call timed out"),
        }
    }
}

impl std::error::Error for CollaboratorError {}

/// Messaging collaborator: delivers messages on a channel.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Delivers a message, idempotent on `dedup_key`.
    async fn send(&self, message: OutgoingMessage) -> Result<DeliveryReceipt, CollaboratorError>;
}

/// AI collaborator: produces a completion for a prompt.
#[async_trait]
pub trait AiCompleter: Send + Sync {
    /// Generates a completion.
    async fn complete(&self, request: AiRequest) -> Result<AiCompletion, CollaboratorError>;
}

/// Booking collaborator: creates bookings.
#[async_trait]
pub trait BookingDesk: Send + Sync {
    /// Creates a booking, idempotent on `dedup_key`. A scheduling conflict
    /// surfaces as [`CollaboratorError::Conflict`].
    async fn create(
        &self,
        request: BookingRequest,
    ) -> Result<BookingConfirmation, CollaboratorError>;
}

/// Contact-tagging collaborator.
#[async_trait]
pub trait ContactTagger: Send + Sync {
    /// Applies a tag to a contact.
    async fn tag(&self, contact_id: ContactId, tag: &str) -> Result<(), CollaboratorError>;
}

/// Channel registry: reports channel connection health.
#[async_trait]
pub trait ChannelRegistry: Send + Sync {
    /// Returns the current status of a channel.
    async fn status(&self, channel_id: ChannelId) -> Result<ChannelStatus, CollaboratorError>;
}

/// The collaborator set handed to the interpreter.
#[derive(Clone)]
pub struct Collaborators {
    pub messenger: Arc<dyn Messenger>,
    pub ai: Arc<dyn AiCompleter>,
    pub bookings: Arc<dyn BookingDesk>,
    pub tagger: Arc<dyn ContactTagger>,
    pub channels: Arc<dyn ChannelRegistry>,
}
