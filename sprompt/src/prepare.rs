//! Turn-to-prompt preparation.

use scommon::{Turn, Utterance, estimate_tokens};

use crate::budget::truncate_to_tokens;
use crate::history::{compact, normalize};
use crate::{
    Language, PromptConfig, PromptError, SafetyRecord, TokenBudget, detect_language, redact,
};

pub const CURRENT_REQUEST_HEADER: &str = "Current request:";

/// Bounded, sanitized prompt for one turn. Computed once and discarded after use.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedPrompt {
    pub system_instruction: String,
    pub user_text: String,
    pub recent: Vec<Utterance>,
    pub summary: Option<String>,
    pub summarized_count: usize,
    pub composite: String,
    pub budget: TokenBudget,
    pub safety: SafetyRecord,
    pub language: Language,
}

/// Builds the prompt for `turn`. Pure: identical inputs give a byte-identical composite.
pub fn prepare(turn: &Turn, config: &PromptConfig) -> Result<PreparedPrompt, PromptError> {
    config.validate()?;

    if turn.text.trim().is_empty() {
        return Err(PromptError::validation("user text must not be empty"));
    }

    let ratio = config.tokens_per_char;
    let system_instruction = config.system_instruction.trim().to_string();
    let system_tokens = estimate_tokens(&system_instruction, ratio);
    let reserved = config.effective_reserved_output_tokens();

    let user_limit = config
        .max_input_tokens
        .checked_sub(reserved)
        .and_then(|left| left.checked_sub(system_tokens))
        .filter(|left| *left > 0)
        .ok_or_else(|| {
            PromptError::invalid_config(format!(
                "system instruction ({system_tokens} tokens) plus reserved output ({reserved} tokens) leave no room within max_input_tokens ({})",
                config.max_input_tokens
            ))
        })?;

    let mut safety = SafetyRecord::default();
    let raw_user = turn.text.trim();
    let sanitized_user = if config.redact_pii {
        redact(raw_user, &mut safety)
    } else {
        raw_user.to_string()
    };

    let (user_text, truncated) = truncate_to_tokens(&sanitized_user, user_limit, ratio);
    if user_text.is_empty() {
        return Err(PromptError::invalid_config(
            "token budget leaves no room for the user text",
        ));
    }
    safety.input_truncated = truncated;

    let mut history = normalize(&turn.history, config.max_history_messages);
    if config.redact_pii {
        for entry in &mut history {
            entry.text = redact(&entry.text, &mut safety);
        }
    }

    let overhead = estimate_tokens(&user_text, ratio) + system_tokens;
    let mut budget = TokenBudget::new(
        config.max_input_tokens,
        reserved,
        overhead,
        config.max_history_tokens,
    );

    let compacted = compact(&history, config, budget.available_for_history);
    budget.history_tokens_used = compacted.tokens_used;

    let language = detect_language(&user_text, config.default_language);

    let current_request = format!("{CURRENT_REQUEST_HEADER}\n{user_text}");
    let composite = [
        Some(system_instruction.as_str()),
        compacted.summary.as_deref(),
        compacted.recent_block.as_deref(),
        Some(current_request.as_str()),
        Some(language.response_guidelines()),
    ]
    .into_iter()
    .flatten()
    .filter(|section| !section.is_empty())
    .collect::<Vec<_>>()
    .join("\n\n");

    Ok(PreparedPrompt {
        system_instruction,
        user_text,
        recent: compacted.recent,
        summary: compacted.summary,
        summarized_count: compacted.summarized_count,
        composite,
        budget,
        safety,
        language,
    })
}
