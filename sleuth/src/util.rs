//! Small convenience constructors for common types.

use scommon::{ConversationId, MessageId, Role, Turn, Utterance};
use sgen::{DeliveryTarget, GenerationRequest};
use sprovider::ProviderKind;

pub fn user_utterance(text: impl Into<String>) -> Utterance {
    Utterance::new(Role::User, text)
}

pub fn assistant_utterance(text: impl Into<String>) -> Utterance {
    Utterance::new(Role::Assistant, text)
}

pub fn system_utterance(text: impl Into<String>) -> Utterance {
    Utterance::new(Role::System, text)
}

pub fn turn(
    conversation_id: impl Into<ConversationId>,
    sequence: u64,
    text: impl Into<String>,
) -> Turn {
    Turn::new(conversation_id, sequence, text)
}

pub fn target(id: impl Into<String>) -> DeliveryTarget {
    DeliveryTarget::new(id)
}

/// Request that reuses `message_id`, for retrying a run whose persist failed.
pub fn retry_request(turn: Turn, message_id: impl Into<MessageId>) -> GenerationRequest {
    GenerationRequest::from_turn(turn).with_message_id(message_id)
}

pub fn parse_provider_kind(value: &str) -> Option<ProviderKind> {
    ProviderKind::parse(value)
}

#[cfg(test)]
mod tests {
    use scommon::Role;
    use sprovider::ProviderKind;

    use super::{parse_provider_kind, retry_request, turn, user_utterance};

    #[test]
    fn parse_provider_kind_supports_aliases() {
        assert_eq!(parse_provider_kind("openai"), Some(ProviderKind::OpenAiCompatible));
        assert_eq!(parse_provider_kind("Claude"), Some(ProviderKind::Anthropic));
        assert_eq!(parse_provider_kind("unknown"), None);
    }

    #[test]
    fn helpers_apply_expected_defaults() {
        assert_eq!(user_utterance("hi").role, Role::User);

        let request = retry_request(turn("conv-1", 4, "again"), "msg-7");
        assert_eq!(request.turn.sequence, 4);
        assert_eq!(request.message_id.map(|id| id.to_string()), Some("msg-7".to_string()));
        assert!(request.prepared.is_none());
    }
}
