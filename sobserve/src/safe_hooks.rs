use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use scommon::{ConversationId, MessageId, RetryHooks, RetryableError, TokenUsage};
use sgen::{DeliveryError, DeliveryTarget, GenerationError, GenerationObserver};
use sledger::{LedgerError, LedgerKey, LedgerObserver, PersistOutcome};

pub struct SafeRetryHooks<H> {
    inner: H,
}

impl<H> SafeRetryHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> RetryHooks for SafeRetryHooks<H>
where
    H: RetryHooks,
{
    fn on_attempt_start(&self, operation: &str, attempt: u32) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_attempt_start(operation, attempt)
        }));
    }

    fn on_retry_scheduled(
        &self,
        operation: &str,
        attempt: u32,
        delay: Duration,
        error: &dyn RetryableError,
    ) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner
                .on_retry_scheduled(operation, attempt, delay, error)
        }));
    }

    fn on_success(&self, operation: &str, attempts: u32) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_success(operation, attempts)
        }));
    }

    fn on_failure(&self, operation: &str, attempts: u32, error: &dyn RetryableError) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_failure(operation, attempts, error)
        }));
    }
}

pub struct SafeGenerationObserver<H> {
    inner: H,
}

impl<H> SafeGenerationObserver<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> GenerationObserver for SafeGenerationObserver<H>
where
    H: GenerationObserver,
{
    fn on_generation_start(&self, message_id: &MessageId, conversation_id: &ConversationId) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_generation_start(message_id, conversation_id)
        }));
    }

    fn on_chunk_delivered(&self, message_id: &MessageId, chunk_index: u64) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_chunk_delivered(message_id, chunk_index)
        }));
    }

    fn on_delivery_degraded(&self, message_id: &MessageId, chunk_index: u64, error: &DeliveryError) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner
                .on_delivery_degraded(message_id, chunk_index, error)
        }));
    }

    fn on_recipient_gone(&self, message_id: &MessageId, target: &DeliveryTarget) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_recipient_gone(message_id, target)
        }));
    }

    fn on_generation_complete(
        &self,
        message_id: &MessageId,
        usage: TokenUsage,
        cost_usd: f64,
        elapsed: Duration,
    ) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner
                .on_generation_complete(message_id, usage, cost_usd, elapsed)
        }));
    }

    fn on_generation_failed(&self, message_id: &MessageId, error: &GenerationError) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_generation_failed(message_id, error)
        }));
    }

    fn on_persisted(&self, message_id: &MessageId, outcome: PersistOutcome) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_persisted(message_id, outcome)
        }));
    }
}

pub struct SafeLedgerObserver<H> {
    inner: H,
}

impl<H> SafeLedgerObserver<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> LedgerObserver for SafeLedgerObserver<H>
where
    H: LedgerObserver,
{
    fn on_stored(&self, key: &LedgerKey, sequence: u64) {
        let _ = catch_unwind(AssertUnwindSafe(|| self.inner.on_stored(key, sequence)));
    }

    fn on_duplicate(&self, key: &LedgerKey) {
        let _ = catch_unwind(AssertUnwindSafe(|| self.inner.on_duplicate(key)));
    }

    fn on_aggregate_failure(&self, key: &LedgerKey, error: &LedgerError) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_aggregate_failure(key, error)
        }));
    }

    fn on_write_failure(&self, key: &LedgerKey, error: &LedgerError) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_write_failure(key, error)
        }));
    }
}
