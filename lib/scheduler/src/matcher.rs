//! Trigger matching: which automations does an event start?
//!
//! An automation matches when it can run (active and channel-bound) and its
//! trigger specification accepts the event. Manual triggers are never
//! matched here; they are admitted only through explicit invocation.

use crate::event::TriggerEvent;
use copper_relay_core::AutomationId;
use copper_relay_flow::automation::{Automation, TriggerSpec};
use tracing::debug;

/// Returns the automations the event should start, in input order.
pub fn match_event<'a>(
    event: &TriggerEvent,
    automations: impl IntoIterator<Item = &'a Automation>,
) -> Vec<AutomationId> {
    let matched: Vec<AutomationId> = automations
        .into_iter()
        .filter(|automation| matches(automation, event))
        .map(|automation| automation.id)
        .collect();

    debug!(event = ?event.event_id(), count = matched.len(), "matched automations");
    matched
}

fn matches(automation: &Automation, event: &TriggerEvent) -> bool {
    if !automation.can_run() {
        return false;
    }

    match (&automation.trigger, event) {
        (TriggerSpec::NewConversation, TriggerEvent::ConversationStarted { channel_id, .. }) => {
            automation.channel_id == Some(*channel_id)
        }
        (
            TriggerSpec::Keyword { keywords },
            TriggerEvent::MessageReceived {
                channel_id, text, ..
            },
        ) => {
            automation.channel_id == Some(*channel_id) && keyword_match(keywords, text)
        }
        (TriggerSpec::BookingCreated, TriggerEvent::BookingCreated { .. }) => true,
        (
            TriggerSpec::BookingStatusChanged { status: filter },
            TriggerEvent::BookingStatusChanged { status, .. },
        ) => filter.is_none_or(|wanted| wanted == *status),
        // Manual triggers only fire through explicit invocation.
        _ => false,
    }
}

/// Case-insensitive substring match against any configured keyword.
fn keyword_match(keywords: &[String], text: &str) -> bool {
    let text = text.to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.is_empty())
        .any(|keyword| text.contains(&keyword.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use copper_relay_core::{ChannelId, ContactId, ConversationId, EventId};
    use copper_relay_flow::automation::BookingStatus;

    fn message_event(channel_id: ChannelId, text: &str) -> TriggerEvent {
        TriggerEvent::MessageReceived {
            event_id: EventId::new(),
            channel_id,
            conversation_id: ConversationId::new(),
            contact_id: ContactId::new(),
            contact_name: None,
            text: text.to_string(),
        }
    }

    fn conversation_event(channel_id: ChannelId) -> TriggerEvent {
        TriggerEvent::ConversationStarted {
            event_id: EventId::new(),
            channel_id,
            conversation_id: ConversationId::new(),
            contact_id: ContactId::new(),
            contact_name: None,
        }
    }

    fn keyword_automation(channel_id: ChannelId, keywords: &[&str]) -> Automation {
        Automation::new(
            "Keyword flow",
            TriggerSpec::Keyword {
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
            },
        )
        .with_channel(channel_id)
    }

    #[test]
    fn keyword_matches_case_insensitive_substring() {
        let channel_id = ChannelId::new();
        let automation = keyword_automation(channel_id, &["book", "appointment"]);

        let matched = match_event(&message_event(channel_id, "I'd like to BOOK a slot"), [&automation]);
        assert_eq!(matched, vec![automation.id]);

        let matched = match_event(&message_event(channel_id, "just saying hi"), [&automation]);
        assert!(matched.is_empty());
    }

    #[test]
    fn keyword_requires_matching_channel() {
        let automation = keyword_automation(ChannelId::new(), &["book"]);
        let other_channel = ChannelId::new();

        let matched = match_event(&message_event(other_channel, "book me in"), [&automation]);
        assert!(matched.is_empty());
    }

    #[test]
    fn new_conversation_matches_bound_channel_only() {
        let channel_id = ChannelId::new();
        let automation =
            Automation::new("Welcome", TriggerSpec::NewConversation).with_channel(channel_id);

        assert_eq!(
            match_event(&conversation_event(channel_id), [&automation]),
            vec![automation.id]
        );
        assert!(match_event(&conversation_event(ChannelId::new()), [&automation]).is_empty());
    }

    #[test]
    fn inactive_automation_never_matches() {
        let channel_id = ChannelId::new();
        let mut automation = keyword_automation(channel_id, &["book"]);
        automation.deactivate();

        let matched = match_event(&message_event(channel_id, "book me"), [&automation]);
        assert!(matched.is_empty());
    }

    #[test]
    fn unbound_automation_never_matches() {
        let automation = Automation::new(
            "No channel",
            TriggerSpec::Keyword {
                keywords: vec!["book".to_string()],
            },
        );

        let matched = match_event(&message_event(ChannelId::new(), "book me"), [&automation]);
        assert!(matched.is_empty());
    }

    #[test]
    fn booking_status_filter_is_honored() {
        let booking_event = |status| TriggerEvent::BookingStatusChanged {
            event_id: EventId::new(),
            booking_id: copper_relay_core::BookingId::new(),
            contact_id: ContactId::new(),
            contact_name: None,
            service_name: None,
            starts_at: None,
            status,
        };

        let cancelled_only = Automation::new(
            "On cancel",
            TriggerSpec::BookingStatusChanged {
                status: Some(BookingStatus::Cancelled),
            },
        )
        .with_channel(ChannelId::new());

        let any_change = Automation::new(
            "On any change",
            TriggerSpec::BookingStatusChanged { status: None },
        )
        .with_channel(ChannelId::new());

        let matched = match_event(
            &booking_event(BookingStatus::Cancelled),
            [&cancelled_only, &any_change],
        );
        assert_eq!(matched, vec![cancelled_only.id, any_change.id]);

        let matched = match_event(
            &booking_event(BookingStatus::Confirmed),
            [&cancelled_only, &any_change],
        );
        assert_eq!(matched, vec![any_change.id]);
    }

    #[test]
    fn manual_event_matches_nothing() {
        let channel_id = ChannelId::new();
        let keyword = keyword_automation(channel_id, &["book"]);
        let manual =
            Automation::new("Manual flow", TriggerSpec::Manual).with_channel(channel_id);

        let event = TriggerEvent::Manual {
            event_id: EventId::new(),
            channel_id: Some(channel_id),
            conversation_id: None,
            contact_id: None,
            contact_name: None,
        };

        assert!(match_event(&event, [&keyword, &manual]).is_empty());
    }
}
