use std::time::Duration;

use scommon::{ConversationId, MessageId, TokenUsage};
use sledger::PersistOutcome;

use crate::{DeliveryError, DeliveryTarget, GenerationError};

/// Best-effort side channel for generation runs. Never required for correctness.
pub trait GenerationObserver: Send + Sync {
    fn on_generation_start(&self, _message_id: &MessageId, _conversation_id: &ConversationId) {}

    fn on_chunk_delivered(&self, _message_id: &MessageId, _chunk_index: u64) {}

    /// A transient failure outlived the delivery retry policy; the chunk was skipped.
    fn on_delivery_degraded(
        &self,
        _message_id: &MessageId,
        _chunk_index: u64,
        _error: &DeliveryError,
    ) {
    }

    fn on_recipient_gone(&self, _message_id: &MessageId, _target: &DeliveryTarget) {}

    fn on_generation_complete(
        &self,
        _message_id: &MessageId,
        _usage: TokenUsage,
        _cost_usd: f64,
        _elapsed: Duration,
    ) {
    }

    fn on_generation_failed(&self, _message_id: &MessageId, _error: &GenerationError) {}

    fn on_persisted(&self, _message_id: &MessageId, _outcome: PersistOutcome) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGenerationObserver;

impl GenerationObserver for NoopGenerationObserver {}
