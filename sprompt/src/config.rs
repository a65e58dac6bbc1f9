//! Explicit tunables for one `prepare` call.

use crate::{Language, PromptError};

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are an investigation assistant. Ground every answer in the conversation context and the evidence the user provides, and never reveal redacted values.";

#[derive(Debug, Clone, PartialEq)]
pub struct PromptConfig {
    pub max_input_tokens: u32,
    pub reserved_output_tokens: u32,
    pub max_history_tokens: u32,
    pub max_history_messages: usize,
    pub tokens_per_char: f64,
    pub redact_pii: bool,
    pub default_language: Language,
    pub system_instruction: String,
    /// Most recent history entries kept verbatim.
    pub tail_window: usize,
    pub recent_entry_char_cap: usize,
    pub summary_bullet_char_cap: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: 8_000,
            reserved_output_tokens: 1_024,
            max_history_tokens: 2_000,
            max_history_messages: 20,
            tokens_per_char: 4.0,
            redact_pii: true,
            default_language: Language::English,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            tail_window: 4,
            recent_entry_char_cap: 600,
            summary_bullet_char_cap: 160,
        }
    }
}

impl PromptConfig {
    pub const MIN_SUMMARY_BULLET_CHARS: usize = 24;

    pub fn with_max_input_tokens(mut self, max_input_tokens: u32) -> Self {
        self.max_input_tokens = max_input_tokens;
        self
    }

    pub fn with_reserved_output_tokens(mut self, reserved_output_tokens: u32) -> Self {
        self.reserved_output_tokens = reserved_output_tokens;
        self
    }

    pub fn with_max_history_tokens(mut self, max_history_tokens: u32) -> Self {
        self.max_history_tokens = max_history_tokens;
        self
    }

    pub fn with_max_history_messages(mut self, max_history_messages: usize) -> Self {
        self.max_history_messages = max_history_messages;
        self
    }

    pub fn with_tokens_per_char(mut self, tokens_per_char: f64) -> Self {
        self.tokens_per_char = tokens_per_char;
        self
    }

    pub fn with_redaction(mut self, enabled: bool) -> Self {
        self.redact_pii = enabled;
        self
    }

    pub fn with_default_language(mut self, language: Language) -> Self {
        self.default_language = language;
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn with_tail_window(mut self, tail_window: usize) -> Self {
        self.tail_window = tail_window;
        self
    }

    /// `floor(max_input_tokens / 2)` caps the configured reservation.
    pub fn effective_reserved_output_tokens(&self) -> u32 {
        self.reserved_output_tokens.min(self.max_input_tokens / 2)
    }

    pub fn validate(&self) -> Result<(), PromptError> {
        if self.max_input_tokens == 0 {
            return Err(PromptError::invalid_config(
                "max_input_tokens must be greater than zero",
            ));
        }

        if !self.tokens_per_char.is_finite() || self.tokens_per_char <= 0.0 {
            return Err(PromptError::invalid_config(format!(
                "tokens_per_char must be a positive number, got {}",
                self.tokens_per_char
            )));
        }

        if self.tail_window == 0 {
            return Err(PromptError::invalid_config("tail_window must be at least 1"));
        }

        if self.recent_entry_char_cap < 4 {
            return Err(PromptError::invalid_config(
                "recent_entry_char_cap must be at least 4",
            ));
        }

        if self.summary_bullet_char_cap < Self::MIN_SUMMARY_BULLET_CHARS {
            return Err(PromptError::invalid_config(format!(
                "summary_bullet_char_cap must be at least {}",
                Self::MIN_SUMMARY_BULLET_CHARS
            )));
        }

        Ok(())
    }
}
