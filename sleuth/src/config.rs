//! The pipeline's configuration surface, as loaded from JSON.
//!
//! ```rust
//! use sleuth::PipelineConfig;
//!
//! let config = PipelineConfig::from_json_str(
//!     r#"{ "model": "gpt-4o-mini", "maxInputTokens": 4000, "redactPII": false }"#,
//! )
//! .expect("config parses");
//!
//! assert_eq!(config.max_input_tokens, 4000);
//! assert!(!config.redact_pii);
//! assert_eq!(config.max_history_messages, 20);
//! ```

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

use scommon::RetryPolicy;
use serde::{Deserialize, Serialize};
use sgen::{GenerationConfig, RecipientGonePolicy};
use sprompt::{Language, PromptConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    Parse,
    Invalid,
    Io,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub message: String,
}

impl ConfigError {
    pub fn new(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::Parse, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::Invalid, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::Io, message)
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for ConfigError {}

/// Attempt cap and backoff bounds for one retried operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub soft_budget_ms: Option<u64>,
}

impl RetrySettings {
    pub fn new(attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            attempts,
            base_delay_ms,
            max_delay_ms,
            soft_budget_ms: None,
        }
    }

    pub fn to_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(self.attempts).with_backoff(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        );
        match self.soft_budget_ms {
            Some(budget) => policy.with_soft_budget(Duration::from_millis(budget)),
            None => policy,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self::new(3, 200, 5_000)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub model: String,
    pub max_input_tokens: u32,
    pub reserved_output_tokens: u32,
    pub max_history_tokens: u32,
    pub max_history_messages: usize,
    pub tokens_per_char: f64,
    #[serde(rename = "redactPII")]
    pub redact_pii: bool,
    pub default_language: Language,
    pub system_instruction: Option<String>,
    pub price_per_k_tokens_in: f64,
    pub price_per_k_tokens_out: f64,
    pub provider_retry: RetrySettings,
    pub delivery_retry: RetrySettings,
    pub persist_partial_on_provider_failure: bool,
    /// Stop consuming and discard the run once the recipient is gone.
    pub stop_on_recipient_gone: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let prompt = PromptConfig::default();
        Self {
            model: String::new(),
            max_input_tokens: prompt.max_input_tokens,
            reserved_output_tokens: prompt.reserved_output_tokens,
            max_history_tokens: prompt.max_history_tokens,
            max_history_messages: prompt.max_history_messages,
            tokens_per_char: prompt.tokens_per_char,
            redact_pii: prompt.redact_pii,
            default_language: prompt.default_language,
            system_instruction: None,
            price_per_k_tokens_in: 0.0,
            price_per_k_tokens_out: 0.0,
            provider_retry: RetrySettings::default(),
            delivery_retry: RetrySettings {
                soft_budget_ms: Some(5_000),
                ..RetrySettings::new(3, 50, 1_000)
            },
            persist_partial_on_provider_failure: false,
            stop_on_recipient_gone: false,
        }
    }
}

impl PipelineConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|error| ConfigError::parse(format!("invalid pipeline config: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|error| {
            ConfigError::io(format!("failed to read '{}': {error}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.prompt_config()?;
        self.generation_config()?;
        Ok(())
    }

    pub fn prompt_config(&self) -> Result<PromptConfig, ConfigError> {
        let mut config = PromptConfig::default()
            .with_max_input_tokens(self.max_input_tokens)
            .with_reserved_output_tokens(self.reserved_output_tokens)
            .with_max_history_tokens(self.max_history_tokens)
            .with_max_history_messages(self.max_history_messages)
            .with_tokens_per_char(self.tokens_per_char)
            .with_redaction(self.redact_pii)
            .with_default_language(self.default_language);
        if let Some(instruction) = &self.system_instruction {
            config = config.with_system_instruction(instruction.clone());
        }

        config
            .validate()
            .map_err(|error| ConfigError::invalid(error.message))?;
        Ok(config)
    }

    pub fn generation_config(&self) -> Result<GenerationConfig, ConfigError> {
        let gone_policy = if self.stop_on_recipient_gone {
            RecipientGonePolicy::StopAndDiscard
        } else {
            RecipientGonePolicy::ContinueAndPersist
        };

        let config = GenerationConfig::new(self.model.clone())
            .with_pricing(self.price_per_k_tokens_in, self.price_per_k_tokens_out)
            .with_provider_retry(self.provider_retry.to_policy())
            .with_delivery_retry(self.delivery_retry.to_policy())
            .with_tokens_per_char(self.tokens_per_char)
            .with_partial_persistence(self.persist_partial_on_provider_failure)
            .with_recipient_gone_policy(gone_policy);

        config
            .validate()
            .map_err(|error| ConfigError::invalid(error.message))?;
        Ok(config)
    }
}
