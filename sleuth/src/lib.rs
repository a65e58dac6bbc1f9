//! Unified facade over the sleuth workspace crates.
//!
//! This crate is designed to be the single dependency for most applications.
//! It re-exports the pipeline crates, loads the JSON configuration surface, and
//! wires prompt preparation, streaming generation, and the history ledger
//! into one [`TurnPipeline`].

mod config;
mod macros;

pub mod prelude;
pub mod runtime;
pub mod util;

pub use scommon;
pub use sgen;
pub use sledger;
pub use sobserve;
pub use sprompt;
pub use sprovider;

pub use config::{ConfigError, ConfigErrorKind, PipelineConfig, RetrySettings};
pub use scommon::{
    BoxFuture, ConversationId, MessageId, RetryHooks, RetryPolicy, Role, TokenUsage, Turn,
    Utterance,
};
pub use sgen::{
    ChannelDelivery, DeliveryError, DeliveryErrorKind, DeliveryPort, DeliveryTarget,
    GenerationConfig, GenerationError, GenerationErrorKind, GenerationObserver, GenerationReport,
    GenerationRequest, HttpCallbackDelivery, RecipientGonePolicy, StreamEvent, StreamEventKind,
    StreamGenerator, WireMessage,
};
pub use sledger::{
    BatchReport, ConversationAggregate, HistoryLedger, LedgerError, LedgerErrorKind,
    LedgerObserver, MessageQuery, PersistOutcome, PersistedMessage, StorageConfig, StoragePort,
};
pub use sobserve::{
    MetricsObservabilityHooks, SafeGenerationObserver, SafeLedgerObserver, SafeRetryHooks,
    TracingObservabilityHooks,
};
pub use sprompt::{
    Language, PreparedPrompt, PromptConfig, PromptError, PromptErrorKind, SafetyRecord,
    TokenBudget, prepare,
};
pub use sprovider::{
    FragmentSource, FragmentStream, ProviderConfig, ProviderError, ProviderErrorKind,
    ProviderKind, ScriptedFragmentSource, create_fragment_source,
};

pub use runtime::{PipelineObservers, TurnPipeline, build_pipeline, pipeline_with};
pub use util::{
    assistant_utterance, parse_provider_kind, retry_request, system_utterance, target, turn,
    user_utterance,
};
