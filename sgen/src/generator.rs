//! One generation run: provider fragments in, ordered events out, one ledger write.

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use scommon::{
    ConversationId, MessageId, NoopRetryHooks, RetryHooks, RetryPolicy, Role, Sleeper,
    TimerSleeper, TokenUsage, Turn, estimate_tokens, execute_with_retry,
};
use sledger::{HistoryLedger, PersistOutcome, PersistedMessage};
use sprompt::{CURRENT_REQUEST_HEADER, PreparedPrompt};
use sprovider::FragmentSource;

use crate::{
    DeliveryError, DeliveryPort, DeliveryTarget, GenerationConfig, GenerationError,
    GenerationObserver, NoopGenerationObserver, RecipientGonePolicy, StreamEvent,
};

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub turn: Turn,
    pub prepared: Option<PreparedPrompt>,
    /// Reuse the same id when retrying a run so the ledger deduplicates it.
    pub message_id: Option<MessageId>,
}

impl GenerationRequest {
    pub fn from_turn(turn: Turn) -> Self {
        Self {
            turn,
            prepared: None,
            message_id: None,
        }
    }

    pub fn prepared(turn: Turn, prepared: PreparedPrompt) -> Self {
        Self {
            turn,
            prepared: Some(prepared),
            message_id: None,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<MessageId>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub sequence: u64,
    pub text: String,
    /// Fragments consumed; the terminal event carries this as its chunk index.
    pub chunk_count: u64,
    pub delivered_chunks: u64,
    pub degraded_chunks: u64,
    pub recipient_gone: bool,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub final_delivered: bool,
    /// `None` when the run was discarded after the recipient went away.
    pub persisted: Option<PersistOutcome>,
    /// The provider failed mid-stream and the partial text was finalized.
    pub partial: bool,
}

#[derive(Clone)]
pub struct StreamGenerator {
    source: Arc<dyn FragmentSource>,
    delivery: Arc<dyn DeliveryPort>,
    ledger: HistoryLedger,
    observer: Arc<dyn GenerationObserver>,
    retry_hooks: Arc<dyn RetryHooks>,
    sleeper: Arc<dyn Sleeper>,
}

impl StreamGenerator {
    pub fn new(
        source: Arc<dyn FragmentSource>,
        delivery: Arc<dyn DeliveryPort>,
        ledger: HistoryLedger,
    ) -> Self {
        Self {
            source,
            delivery,
            ledger,
            observer: Arc::new(NoopGenerationObserver),
            retry_hooks: Arc::new(NoopRetryHooks),
            sleeper: Arc::new(TimerSleeper),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn GenerationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_retry_hooks(mut self, retry_hooks: Arc<dyn RetryHooks>) -> Self {
        self.retry_hooks = retry_hooks;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    /// Runs one generation for `request`, delivering to `target`.
    ///
    /// On success the recipient has seen chunk indices `0..N` (minus any skipped
    /// after retries or after the recipient went away) and one final event with
    /// index `N`; the answer is persisted unless the run was discarded under
    /// [`RecipientGonePolicy::StopAndDiscard`].
    pub async fn generate(
        &self,
        request: GenerationRequest,
        target: &DeliveryTarget,
        config: &GenerationConfig,
    ) -> Result<GenerationReport, GenerationError> {
        let started = Instant::now();
        let run = RunIdentity::for_request(&request);
        let mut progress = DeliveryProgress::default();

        if let Err(error) = validate(&request, &run, config) {
            return Err(self
                .fail(&run, target, config, &mut progress, 0, error)
                .await);
        }

        self.observer
            .on_generation_start(&run.message_id, &run.conversation_id);

        let prompt = match &request.prepared {
            Some(prepared) => prepared.composite.clone(),
            None => fallback_prompt(&request.turn),
        };

        let opened = execute_with_retry(
            "provider_open",
            &config.provider_retry,
            self.retry_hooks.as_ref(),
            |_attempt| self.source.stream(&config.model, &prompt),
            |delay| self.sleeper.sleep(delay),
        )
        .await;
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(error) => {
                let error = GenerationError::generation_failed(format!(
                    "provider stream could not be opened: {error}"
                ));
                return Err(self
                    .fail(&run, target, config, &mut progress, 0, error)
                    .await);
            }
        };

        let mut text = String::new();
        let mut chunk_count = 0_u64;
        let mut partial = false;

        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    let chunk_index = chunk_count;
                    chunk_count += 1;
                    text.push_str(&fragment);

                    if !progress.recipient_gone {
                        let event = StreamEvent::chunk(
                            run.message_id.clone(),
                            run.conversation_id.clone(),
                            run.sequence,
                            chunk_index,
                            fragment,
                        );
                        let outcome = self.deliver(&event, target, &config.delivery_retry).await;
                        progress.record(self.observer.as_ref(), &run, target, chunk_index, outcome);
                    }

                    if progress.recipient_gone
                        && config.recipient_gone_policy == RecipientGonePolicy::StopAndDiscard
                    {
                        return Ok(GenerationReport {
                            message_id: run.message_id,
                            conversation_id: run.conversation_id,
                            sequence: run.sequence,
                            text,
                            chunk_count,
                            delivered_chunks: progress.delivered,
                            degraded_chunks: progress.degraded,
                            recipient_gone: true,
                            usage: TokenUsage::default(),
                            cost_usd: 0.0,
                            final_delivered: false,
                            persisted: None,
                            partial: false,
                        });
                    }
                }
                Err(error) => {
                    if config.persist_partial_on_provider_failure && chunk_count > 0 {
                        partial = true;
                        break;
                    }

                    let error = GenerationError::generation_failed(format!(
                        "provider stream failed after {chunk_count} fragment(s): {error}"
                    ));
                    return Err(self
                        .fail(&run, target, config, &mut progress, chunk_count, error)
                        .await);
                }
            }
        }
        drop(stream);

        let usage = estimate_usage(&prompt, &text, request.prepared.as_ref(), config);
        let cost_usd = config.cost_for(usage.input_tokens, usage.output_tokens);

        let mut final_delivered = false;
        if !progress.recipient_gone {
            let terminal = StreamEvent::terminal(
                run.message_id.clone(),
                run.conversation_id.clone(),
                run.sequence,
                chunk_count,
                text.clone(),
                usage,
                cost_usd,
            );
            let outcome = self.deliver(&terminal, target, &config.delivery_retry).await;
            final_delivered = outcome.is_ok();
            progress.record(self.observer.as_ref(), &run, target, chunk_count, outcome);
        }

        self.observer.on_generation_complete(
            &run.message_id,
            usage,
            cost_usd,
            started.elapsed(),
        );

        let message = PersistedMessage::new(
            run.conversation_id.clone(),
            run.sequence,
            run.message_id.clone(),
            Role::Assistant,
            text.clone(),
        )
        .with_usage(usage)
        .with_cost(cost_usd);

        let persisted = match self.ledger.persist(&message).await {
            Ok(outcome) => outcome,
            Err(error) => {
                let error = GenerationError::storage(format!(
                    "message '{}' was generated but not stored: {}",
                    run.message_id, error.message
                ));
                self.observer.on_generation_failed(&run.message_id, &error);
                return Err(error);
            }
        };
        self.observer.on_persisted(&run.message_id, persisted);

        Ok(GenerationReport {
            message_id: run.message_id,
            conversation_id: run.conversation_id,
            sequence: run.sequence,
            text,
            chunk_count,
            delivered_chunks: progress.delivered,
            degraded_chunks: progress.degraded,
            recipient_gone: progress.recipient_gone,
            usage,
            cost_usd,
            final_delivered,
            persisted: Some(persisted),
            partial,
        })
    }

    /// Reports a failure found before generation began, such as a prompt that could
    /// not be prepared, with the same best-effort error event `generate` sends.
    pub async fn reject(
        &self,
        request: &GenerationRequest,
        target: &DeliveryTarget,
        config: &GenerationConfig,
        error: GenerationError,
    ) -> GenerationError {
        let run = RunIdentity::for_request(request);
        let mut progress = DeliveryProgress::default();
        self.fail(&run, target, config, &mut progress, 0, error)
            .await
    }

    async fn deliver(
        &self,
        event: &StreamEvent,
        target: &DeliveryTarget,
        policy: &RetryPolicy,
    ) -> Result<(), DeliveryError> {
        let wire = event.to_wire();
        execute_with_retry(
            "delivery",
            policy,
            self.retry_hooks.as_ref(),
            |_attempt| self.delivery.send(target, &wire),
            |delay| self.sleeper.sleep(delay),
        )
        .await
    }

    /// Sends the best-effort error event and reports `error`.
    async fn fail(
        &self,
        run: &RunIdentity,
        target: &DeliveryTarget,
        config: &GenerationConfig,
        progress: &mut DeliveryProgress,
        chunk_index: u64,
        error: GenerationError,
    ) -> GenerationError {
        self.observer.on_generation_failed(&run.message_id, &error);

        if !progress.recipient_gone {
            let event = StreamEvent::error(
                run.message_id.clone(),
                run.conversation_id.clone(),
                run.sequence,
                chunk_index,
                error.message.clone(),
            );
            let outcome = self.deliver(&event, target, &config.delivery_retry).await;
            progress.record(self.observer.as_ref(), run, target, chunk_index, outcome);
        }

        error
    }
}

struct RunIdentity {
    message_id: MessageId,
    conversation_id: ConversationId,
    sequence: u64,
}

impl RunIdentity {
    fn for_request(request: &GenerationRequest) -> Self {
        Self {
            message_id: request
                .message_id
                .clone()
                .unwrap_or_else(MessageId::generate),
            conversation_id: request.turn.conversation_id.clone(),
            sequence: request.turn.sequence,
        }
    }
}

#[derive(Default)]
struct DeliveryProgress {
    delivered: u64,
    degraded: u64,
    recipient_gone: bool,
}

impl DeliveryProgress {
    fn record(
        &mut self,
        observer: &dyn GenerationObserver,
        run: &RunIdentity,
        target: &DeliveryTarget,
        chunk_index: u64,
        outcome: Result<(), DeliveryError>,
    ) {
        match outcome {
            Ok(()) => {
                self.delivered += 1;
                observer.on_chunk_delivered(&run.message_id, chunk_index);
            }
            Err(error) if error.is_gone() => {
                self.recipient_gone = true;
                observer.on_recipient_gone(&run.message_id, target);
            }
            Err(error) => {
                self.degraded += 1;
                observer.on_delivery_degraded(&run.message_id, chunk_index, &error);
            }
        }
    }
}

fn validate(
    request: &GenerationRequest,
    run: &RunIdentity,
    config: &GenerationConfig,
) -> Result<(), GenerationError> {
    config.validate()?;

    if run.conversation_id.is_blank() {
        return Err(GenerationError::validation(
            "conversation_id must not be empty",
        ));
    }

    if run.message_id.is_blank() {
        return Err(GenerationError::validation("message_id must not be empty"));
    }

    if request.turn.text.trim().is_empty() {
        return Err(GenerationError::validation("user text must not be empty"));
    }

    Ok(())
}

/// Minimal prompt for callers that skipped preparation: raw history, then the request.
pub fn fallback_prompt(turn: &Turn) -> String {
    let mut prompt = String::new();
    for utterance in &turn.history {
        let text = utterance.text.trim();
        if text.is_empty() {
            continue;
        }
        prompt.push_str(utterance.role.as_str());
        prompt.push_str(": ");
        prompt.push_str(text);
        prompt.push('\n');
    }

    if !prompt.is_empty() {
        prompt.push('\n');
    }
    prompt.push_str(CURRENT_REQUEST_HEADER);
    prompt.push('\n');
    prompt.push_str(turn.text.trim());
    prompt
}

fn estimate_usage(
    prompt: &str,
    answer: &str,
    prepared: Option<&PreparedPrompt>,
    config: &GenerationConfig,
) -> TokenUsage {
    let raw_input = estimate_tokens(prompt, config.tokens_per_char);
    let input = match prepared {
        Some(prepared) => raw_input.min(prepared.budget.prompt_tokens()),
        None => raw_input,
    };

    TokenUsage::new(input, estimate_tokens(answer, config.tokens_per_char))
}
