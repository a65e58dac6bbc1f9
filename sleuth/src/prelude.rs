//! Common imports for most sleuth applications.

pub use crate::{
    assistant_utterance, build_pipeline, parse_provider_kind, pipeline_with, retry_request,
    system_utterance, target, turn, user_utterance,
};
pub use crate::{sl_history, sl_turn, sl_utterance};
pub use crate::{
    ChannelDelivery, ConfigError, ConversationId, DeliveryPort, DeliveryTarget, GenerationConfig,
    GenerationError, GenerationErrorKind, GenerationReport, HistoryLedger, MessageId,
    PipelineConfig, PipelineObservers, PromptConfig, ProviderConfig, Role, StorageConfig,
    StreamEventKind, Turn, TurnPipeline, Utterance, WireMessage,
};
