//! Structured `tracing` events for retry, generation, and ledger phases.
//!
//! ```rust
//! use sgen::GenerationObserver;
//! use sobserve::TracingObservabilityHooks;
//!
//! fn accepts_observer(_observer: &dyn GenerationObserver) {}
//!
//! let hooks = TracingObservabilityHooks;
//! accepts_observer(&hooks);
//! ```

use std::time::Duration;

use scommon::{ConversationId, MessageId, RetryHooks, RetryableError, TokenUsage};
use sgen::{DeliveryError, DeliveryTarget, GenerationError, GenerationObserver};
use sledger::{LedgerError, LedgerKey, LedgerObserver, PersistOutcome};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObservabilityHooks;

impl RetryHooks for TracingObservabilityHooks {
    fn on_attempt_start(&self, operation: &str, attempt: u32) {
        tracing::debug!(phase = "retry", event = "attempt_start", operation, attempt);
    }

    fn on_retry_scheduled(
        &self,
        operation: &str,
        attempt: u32,
        delay: Duration,
        error: &dyn RetryableError,
    ) {
        tracing::warn!(
            phase = "retry",
            event = "retry_scheduled",
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error_kind = error.kind_label(),
            retryable = error.is_retryable(),
            error = %error
        );
    }

    fn on_success(&self, operation: &str, attempts: u32) {
        tracing::debug!(phase = "retry", event = "success", operation, attempts);
    }

    fn on_failure(&self, operation: &str, attempts: u32, error: &dyn RetryableError) {
        tracing::warn!(
            phase = "retry",
            event = "failure",
            operation,
            attempts,
            error_kind = error.kind_label(),
            retryable = error.is_retryable(),
            error = %error
        );
    }
}

impl GenerationObserver for TracingObservabilityHooks {
    fn on_generation_start(&self, message_id: &MessageId, conversation_id: &ConversationId) {
        tracing::info!(
            phase = "generation",
            event = "start",
            message_id = %message_id,
            conversation_id = %conversation_id
        );
    }

    fn on_chunk_delivered(&self, message_id: &MessageId, chunk_index: u64) {
        tracing::trace!(
            phase = "generation",
            event = "chunk_delivered",
            message_id = %message_id,
            chunk_index
        );
    }

    fn on_delivery_degraded(&self, message_id: &MessageId, chunk_index: u64, error: &DeliveryError) {
        tracing::warn!(
            phase = "generation",
            event = "delivery_degraded",
            message_id = %message_id,
            chunk_index,
            error_kind = error.kind_label(),
            error = %error
        );
    }

    fn on_recipient_gone(&self, message_id: &MessageId, target: &DeliveryTarget) {
        tracing::info!(
            phase = "generation",
            event = "recipient_gone",
            message_id = %message_id,
            target = %target
        );
    }

    fn on_generation_complete(
        &self,
        message_id: &MessageId,
        usage: TokenUsage,
        cost_usd: f64,
        elapsed: Duration,
    ) {
        tracing::info!(
            phase = "generation",
            event = "complete",
            message_id = %message_id,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost_usd,
            elapsed_ms = elapsed.as_millis() as u64
        );
    }

    fn on_generation_failed(&self, message_id: &MessageId, error: &GenerationError) {
        tracing::error!(
            phase = "generation",
            event = "failure",
            message_id = %message_id,
            error_kind = error.kind.label(),
            error = %error
        );
    }

    fn on_persisted(&self, message_id: &MessageId, outcome: PersistOutcome) {
        tracing::info!(
            phase = "generation",
            event = "persisted",
            message_id = %message_id,
            stored = outcome.stored
        );
    }
}

impl LedgerObserver for TracingObservabilityHooks {
    fn on_stored(&self, key: &LedgerKey, sequence: u64) {
        tracing::info!(
            phase = "ledger",
            event = "stored",
            conversation_id = %key.conversation_id,
            message_id = %key.message_id,
            sequence
        );
    }

    fn on_duplicate(&self, key: &LedgerKey) {
        tracing::info!(
            phase = "ledger",
            event = "duplicate",
            conversation_id = %key.conversation_id,
            message_id = %key.message_id
        );
    }

    fn on_aggregate_failure(&self, key: &LedgerKey, error: &LedgerError) {
        tracing::warn!(
            phase = "ledger",
            event = "aggregate_failure",
            conversation_id = %key.conversation_id,
            message_id = %key.message_id,
            error_kind = error.kind.label(),
            error = %error
        );
    }

    fn on_write_failure(&self, key: &LedgerKey, error: &LedgerError) {
        tracing::error!(
            phase = "ledger",
            event = "write_failure",
            conversation_id = %key.conversation_id,
            message_id = %key.message_id,
            error_kind = error.kind.label(),
            error = %error
        );
    }
}
