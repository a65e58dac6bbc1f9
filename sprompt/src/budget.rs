//! Token budget arithmetic for one prepared prompt.

use scommon::estimate_tokens;

/// Breakdown of how the input window is spent.
///
/// `reserved_output_tokens + overhead_tokens + history_tokens_used <= max_input_tokens`
/// holds for every value returned by `prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    pub max_input_tokens: u32,
    pub reserved_output_tokens: u32,
    /// Sanitized user text plus system instruction.
    pub overhead_tokens: u32,
    pub available_for_history: u32,
    pub history_tokens_used: u32,
}

impl TokenBudget {
    pub fn new(
        max_input_tokens: u32,
        reserved_output_tokens: u32,
        overhead_tokens: u32,
        max_history_tokens: u32,
    ) -> Self {
        let remaining = max_input_tokens
            .saturating_sub(reserved_output_tokens)
            .saturating_sub(overhead_tokens);

        Self {
            max_input_tokens,
            reserved_output_tokens,
            overhead_tokens,
            available_for_history: remaining.min(max_history_tokens),
            history_tokens_used: 0,
        }
    }

    pub fn committed_tokens(&self) -> u32 {
        self.reserved_output_tokens
            .saturating_add(self.overhead_tokens)
            .saturating_add(self.history_tokens_used)
    }

    pub fn is_within_limit(&self) -> bool {
        self.committed_tokens() <= self.max_input_tokens
    }

    /// Tokens the prompt itself is expected to consume.
    pub fn prompt_tokens(&self) -> u32 {
        self.overhead_tokens.saturating_add(self.history_tokens_used)
    }
}

/// Truncates `text` to at most `limit` estimated tokens. Returns whether anything was cut.
pub(crate) fn truncate_to_tokens(text: &str, limit: u32, tokens_per_char: f64) -> (String, bool) {
    if estimate_tokens(text, tokens_per_char) <= limit {
        return (text.to_string(), false);
    }

    let keep = scommon::chars_for_tokens(limit, tokens_per_char);
    let mut truncated = text.chars().take(keep).collect::<String>();
    while !truncated.is_empty() && estimate_tokens(&truncated, tokens_per_char) > limit {
        truncated.pop();
    }

    (truncated.trim_end().to_string(), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_history_is_clamped_by_both_limits() {
        let budget = TokenBudget::new(1_000, 200, 100, 2_000);
        assert_eq!(budget.available_for_history, 700);

        let budget = TokenBudget::new(1_000, 200, 100, 300);
        assert_eq!(budget.available_for_history, 300);

        let budget = TokenBudget::new(100, 50, 80, 300);
        assert_eq!(budget.available_for_history, 0);
    }

    #[test]
    fn truncation_respects_token_limit() {
        let (text, truncated) = truncate_to_tokens("abcdefghijkl", 2, 4.0);
        assert!(truncated);
        assert_eq!(text, "abcdefgh");

        let (text, truncated) = truncate_to_tokens("abc", 2, 4.0);
        assert!(!truncated);
        assert_eq!(text, "abc");
    }
}
