//! `metrics` counters and histograms for retry, generation, and ledger phases.
//!
//! ```rust
//! use scommon::RetryHooks;
//! use sobserve::MetricsObservabilityHooks;
//!
//! fn accepts_retry_hooks(_hooks: &dyn RetryHooks) {}
//!
//! let hooks = MetricsObservabilityHooks;
//! accepts_retry_hooks(&hooks);
//! ```

use std::time::Duration;

use scommon::{ConversationId, MessageId, RetryHooks, RetryableError, TokenUsage};
use sgen::{DeliveryError, DeliveryTarget, GenerationError, GenerationObserver};
use sledger::{LedgerError, LedgerKey, LedgerObserver, PersistOutcome};

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsObservabilityHooks;

impl RetryHooks for MetricsObservabilityHooks {
    fn on_attempt_start(&self, operation: &str, _attempt: u32) {
        metrics::counter!(
            "sleuth_retry_attempt_start_total",
            "operation" => operation.to_string()
        )
        .increment(1);
    }

    fn on_retry_scheduled(
        &self,
        operation: &str,
        _attempt: u32,
        delay: Duration,
        error: &dyn RetryableError,
    ) {
        metrics::counter!(
            "sleuth_retry_scheduled_total",
            "operation" => operation.to_string(),
            "error_kind" => error.kind_label()
        )
        .increment(1);
        metrics::histogram!(
            "sleuth_retry_delay_seconds",
            "operation" => operation.to_string()
        )
        .record(delay.as_secs_f64());
    }

    fn on_success(&self, operation: &str, attempts: u32) {
        metrics::counter!(
            "sleuth_retry_success_total",
            "operation" => operation.to_string()
        )
        .increment(1);
        metrics::histogram!(
            "sleuth_retry_attempts_per_success",
            "operation" => operation.to_string()
        )
        .record(attempts as f64);
    }

    fn on_failure(&self, operation: &str, attempts: u32, error: &dyn RetryableError) {
        metrics::counter!(
            "sleuth_retry_failure_total",
            "operation" => operation.to_string(),
            "error_kind" => error.kind_label()
        )
        .increment(1);
        metrics::histogram!(
            "sleuth_retry_attempts_per_failure",
            "operation" => operation.to_string()
        )
        .record(attempts as f64);
    }
}

impl GenerationObserver for MetricsObservabilityHooks {
    fn on_generation_start(&self, _message_id: &MessageId, _conversation_id: &ConversationId) {
        metrics::counter!("sleuth_generation_start_total").increment(1);
    }

    fn on_chunk_delivered(&self, _message_id: &MessageId, _chunk_index: u64) {
        metrics::counter!("sleuth_delivery_delivered_total").increment(1);
    }

    fn on_delivery_degraded(
        &self,
        _message_id: &MessageId,
        _chunk_index: u64,
        error: &DeliveryError,
    ) {
        metrics::counter!(
            "sleuth_delivery_degraded_total",
            "error_kind" => error.kind_label()
        )
        .increment(1);
    }

    fn on_recipient_gone(&self, _message_id: &MessageId, _target: &DeliveryTarget) {
        metrics::counter!("sleuth_delivery_recipient_gone_total").increment(1);
    }

    fn on_generation_complete(
        &self,
        _message_id: &MessageId,
        usage: TokenUsage,
        cost_usd: f64,
        elapsed: Duration,
    ) {
        metrics::counter!("sleuth_generation_success_total").increment(1);
        metrics::counter!("sleuth_generation_tokens_total", "direction" => "input")
            .increment(u64::from(usage.input_tokens));
        metrics::counter!("sleuth_generation_tokens_total", "direction" => "output")
            .increment(u64::from(usage.output_tokens));
        metrics::histogram!("sleuth_generation_cost_usd").record(cost_usd);
        metrics::histogram!(
            "sleuth_generation_duration_seconds",
            "status" => "success"
        )
        .record(elapsed.as_secs_f64());
    }

    fn on_generation_failed(&self, _message_id: &MessageId, error: &GenerationError) {
        metrics::counter!(
            "sleuth_generation_failure_total",
            "error_kind" => error.kind.label()
        )
        .increment(1);
    }

    fn on_persisted(&self, _message_id: &MessageId, outcome: PersistOutcome) {
        let result = if outcome.stored { "stored" } else { "duplicate" };
        metrics::counter!("sleuth_generation_persisted_total", "result" => result).increment(1);
    }
}

impl LedgerObserver for MetricsObservabilityHooks {
    fn on_stored(&self, _key: &LedgerKey, _sequence: u64) {
        metrics::counter!("sleuth_ledger_stored_total").increment(1);
    }

    fn on_duplicate(&self, _key: &LedgerKey) {
        metrics::counter!("sleuth_ledger_duplicate_total").increment(1);
    }

    fn on_aggregate_failure(&self, _key: &LedgerKey, error: &LedgerError) {
        metrics::counter!(
            "sleuth_ledger_aggregate_failure_total",
            "error_kind" => error.kind.label()
        )
        .increment(1);
    }

    fn on_write_failure(&self, _key: &LedgerKey, error: &LedgerError) {
        metrics::counter!(
            "sleuth_ledger_write_failure_total",
            "error_kind" => error.kind.label()
        )
        .increment(1);
    }
}
