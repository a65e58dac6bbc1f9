//! Runtime wiring: prepare, generate and persist behind one handle.

use std::sync::Arc;

use scommon::{ConversationId, MessageId, RetryHooks, Turn};
use sgen::{
    DeliveryPort, DeliveryTarget, GenerationConfig, GenerationError, GenerationObserver,
    GenerationReport, GenerationRequest, StreamGenerator,
};
use sledger::{HistoryLedger, LedgerObserver, StorageConfig, StoragePort, create_storage};
use sobserve::{
    SafeGenerationObserver, SafeLedgerObserver, SafeRetryHooks, TracingObservabilityHooks,
};
use sprompt::{PromptConfig, prepare};
use sprovider::{FragmentSource, ProviderConfig, create_fragment_source};

use crate::{ConfigError, PipelineConfig};

#[derive(Clone)]
pub struct TurnPipeline {
    generator: StreamGenerator,
    prompt: PromptConfig,
    generation: GenerationConfig,
}

impl TurnPipeline {
    pub fn new(
        generator: StreamGenerator,
        prompt: PromptConfig,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            generator,
            prompt,
            generation,
        }
    }

    pub fn generator(&self) -> &StreamGenerator {
        &self.generator
    }

    pub fn ledger(&self) -> &HistoryLedger {
        self.generator.ledger()
    }

    pub fn prompt_config(&self) -> &PromptConfig {
        &self.prompt
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation
    }

    /// Prepares `turn`, streams the answer to `target`, and records it.
    ///
    /// Pass the `message_id` of an earlier failed attempt to retry it without
    /// creating a second ledger record.
    pub async fn run_turn(
        &self,
        turn: Turn,
        target: &DeliveryTarget,
        message_id: Option<MessageId>,
    ) -> Result<GenerationReport, GenerationError> {
        let prepared = prepare(&turn, &self.prompt);
        let mut request = GenerationRequest::from_turn(turn);
        request.message_id = message_id;

        match prepared {
            Ok(prepared) => {
                request.prepared = Some(prepared);
                self.generator
                    .generate(request, target, &self.generation)
                    .await
            }
            Err(error) => Err(self
                .generator
                .reject(&request, target, &self.generation, error.into())
                .await),
        }
    }

    /// Builds the next turn of a conversation with history read back from the ledger.
    pub async fn next_turn(
        &self,
        conversation_id: impl Into<ConversationId>,
        sequence: u64,
        text: impl Into<String>,
    ) -> Result<Turn, GenerationError> {
        let conversation_id = conversation_id.into();
        let history = self
            .ledger()
            .recent_utterances(&conversation_id, self.prompt.max_history_messages)
            .await?;
        Ok(Turn::new(conversation_id, sequence, text).with_history(history))
    }
}

/// Observers installed by [`build_pipeline`]; each one is wrapped so a panic never
/// reaches the pipeline.
#[derive(Clone)]
pub struct PipelineObservers {
    pub generation: Arc<dyn GenerationObserver>,
    pub retry: Arc<dyn RetryHooks>,
    pub ledger: Arc<dyn LedgerObserver>,
}

impl PipelineObservers {
    pub fn tracing() -> Self {
        Self {
            generation: Arc::new(SafeGenerationObserver::new(TracingObservabilityHooks)),
            retry: Arc::new(SafeRetryHooks::new(TracingObservabilityHooks)),
            ledger: Arc::new(SafeLedgerObserver::new(TracingObservabilityHooks)),
        }
    }
}

impl Default for PipelineObservers {
    fn default() -> Self {
        Self::tracing()
    }
}

pub fn pipeline_with(
    config: &PipelineConfig,
    source: Arc<dyn FragmentSource>,
    delivery: Arc<dyn DeliveryPort>,
    storage: Arc<dyn StoragePort>,
    observers: PipelineObservers,
) -> Result<TurnPipeline, ConfigError> {
    let prompt = config.prompt_config()?;
    let generation = config.generation_config()?;

    let ledger = HistoryLedger::new(storage).with_observer(observers.ledger);
    let generator = StreamGenerator::new(source, delivery, ledger)
        .with_observer(observers.generation)
        .with_retry_hooks(observers.retry);

    Ok(TurnPipeline::new(generator, prompt, generation))
}

/// Builds a pipeline from configuration values, with tracing observers.
pub fn build_pipeline(
    config: &PipelineConfig,
    provider: &ProviderConfig,
    storage: &StorageConfig,
    delivery: Arc<dyn DeliveryPort>,
) -> Result<TurnPipeline, ConfigError> {
    let source = create_fragment_source(provider)
        .map_err(|error| ConfigError::invalid(format!("provider: {error}")))?;
    let storage = create_storage(storage.clone())
        .map_err(|error| ConfigError::io(format!("storage: {error}")))?;

    pipeline_with(
        config,
        source,
        delivery,
        storage,
        PipelineObservers::default(),
    )
}

#[cfg(test)]
mod tests {
    use sgen::{ChannelDelivery, GenerationErrorKind, StreamEventKind};
    use sledger::PersistOutcome;

    use super::*;
    use crate::ConfigErrorKind;

    fn scripted_pipeline(
        fragments: &[&str],
        config: &PipelineConfig,
    ) -> (TurnPipeline, Arc<ChannelDelivery>) {
        let delivery = Arc::new(ChannelDelivery::new());
        let pipeline = build_pipeline(
            config,
            &ProviderConfig::scripted(fragments.iter().copied()),
            &StorageConfig::InMemory,
            delivery.clone(),
        )
        .expect("pipeline builds");
        (pipeline, delivery)
    }

    #[tokio::test]
    async fn run_turn_prepares_generates_and_persists() {
        let (pipeline, delivery) =
            scripted_pipeline(&["Hel", "lo"], &PipelineConfig::new("model-a"));
        let target = DeliveryTarget::new("conn-1");
        let mut inbox = delivery.register(&target);

        let report = pipeline
            .run_turn(Turn::new("conv-1", 1, "hello"), &target, None)
            .await
            .expect("turn runs");

        assert_eq!(report.text, "Hello");
        assert_eq!(report.persisted, Some(PersistOutcome { stored: true }));
        let mut kinds = Vec::new();
        while let Ok(message) = inbox.try_recv() {
            kinds.push(message.message_type);
        }
        assert_eq!(
            kinds,
            vec![StreamEventKind::Chunk, StreamEventKind::Chunk, StreamEventKind::Final]
        );
    }

    #[tokio::test]
    async fn prepare_failure_sends_error_event() {
        let (pipeline, delivery) =
            scripted_pipeline(&["unused"], &PipelineConfig::new("model-a"));
        let target = DeliveryTarget::new("conn-1");
        let mut inbox = delivery.register(&target);

        let error = pipeline
            .run_turn(Turn::new("conv-1", 1, "  "), &target, Some(MessageId::new("m-9")))
            .await
            .expect_err("blank text");

        assert_eq!(error.kind, GenerationErrorKind::Validation);
        let event = inbox.try_recv().expect("error event");
        assert_eq!(event.message_type, StreamEventKind::Error);
        assert_eq!(event.message_id, "m-9");
    }

    #[tokio::test]
    async fn next_turn_reads_history_from_the_ledger() {
        let (pipeline, _delivery) =
            scripted_pipeline(&["first answer"], &PipelineConfig::new("m"));
        let target = DeliveryTarget::new("nobody");

        pipeline
            .run_turn(Turn::new("conv-3", 1, "first question"), &target, None)
            .await
            .expect("first turn");
        let turn = pipeline
            .next_turn("conv-3", 2, "follow-up")
            .await
            .expect("next turn");

        assert_eq!(turn.sequence, 2);
        assert_eq!(turn.history.len(), 1);
        assert_eq!(turn.history[0].text, "first answer");
    }

    #[test]
    fn invalid_provider_config_is_rejected() {
        let result = build_pipeline(
            &PipelineConfig::new("m"),
            &ProviderConfig::scripted(["x"]).with_max_output_tokens(0),
            &StorageConfig::InMemory,
            Arc::new(ChannelDelivery::new()),
        );

        assert_eq!(
            result.err().map(|error| error.kind),
            Some(ConfigErrorKind::Invalid)
        );
    }
}
