//! History normalization and extractive compaction.

use scommon::{Utterance, estimate_tokens};

use crate::PromptConfig;

pub(crate) const SUMMARY_HEADER: &str = "Summary of earlier conversation:";
pub(crate) const RECENT_HEADER: &str = "Recent conversation:";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CompactedHistory {
    pub recent: Vec<Utterance>,
    pub recent_block: Option<String>,
    pub summary: Option<String>,
    pub summarized_count: usize,
    pub tokens_used: u32,
}

/// Trims entries, drops blank ones, and keeps the newest `max_messages`.
pub(crate) fn normalize(history: &[Utterance], max_messages: usize) -> Vec<Utterance> {
    let kept = history
        .iter()
        .filter_map(|entry| {
            let text = entry.text.trim();
            (!text.is_empty()).then(|| Utterance::new(entry.role, text))
        })
        .collect::<Vec<_>>();

    let skip = kept.len().saturating_sub(max_messages);
    kept.into_iter().skip(skip).collect()
}

pub(crate) fn compact(
    history: &[Utterance],
    config: &PromptConfig,
    available: u32,
) -> CompactedHistory {
    let ratio = config.tokens_per_char;
    let tail_start = history.len().saturating_sub(config.tail_window);
    let (older, tail) = history.split_at(tail_start);

    let summary_limit = available.saturating_mul(3) / 5;
    let mut summary = None;
    let mut summarized_count = 0;
    let mut bullets = older;
    let mut cap = config.summary_bullet_char_cap;

    while !bullets.is_empty() {
        let rendered = render_summary(bullets, cap);
        if estimate_tokens(&rendered, ratio) <= summary_limit {
            summarized_count = bullets.len();
            summary = Some(rendered);
            break;
        }

        if cap > PromptConfig::MIN_SUMMARY_BULLET_CHARS {
            cap = (cap - cap / 4).max(PromptConfig::MIN_SUMMARY_BULLET_CHARS);
        } else {
            bullets = &bullets[1..];
        }
    }

    let summary_tokens = summary
        .as_deref()
        .map(|text| estimate_tokens(text, ratio))
        .unwrap_or(0);

    let mut recent = tail;
    loop {
        if recent.is_empty() {
            return CompactedHistory {
                recent: Vec::new(),
                recent_block: None,
                summary,
                summarized_count,
                tokens_used: summary_tokens,
            };
        }

        let block = render_recent(recent, config.recent_entry_char_cap);
        let recent_tokens = estimate_tokens(&block, ratio);
        if summary_tokens + recent_tokens <= available {
            return CompactedHistory {
                recent: recent.to_vec(),
                recent_block: Some(block),
                summary,
                summarized_count,
                tokens_used: summary_tokens + recent_tokens,
            };
        }

        recent = &recent[1..];
    }
}

fn render_summary(entries: &[Utterance], bullet_cap: usize) -> String {
    let mut block = String::from(SUMMARY_HEADER);
    for entry in entries {
        let flattened = entry.text.split_whitespace().collect::<Vec<_>>().join(" ");
        block.push_str("\n- ");
        block.push_str(entry.role.as_str());
        block.push_str(": ");
        block.push_str(&truncate_chars(&flattened, bullet_cap));
    }
    block
}

fn render_recent(entries: &[Utterance], entry_cap: usize) -> String {
    let mut block = String::from(RECENT_HEADER);
    for entry in entries {
        block.push('\n');
        block.push_str(entry.role.as_str());
        block.push_str(": ");
        block.push_str(&truncate_chars(&entry.text, entry_cap));
    }
    block
}

pub(crate) fn truncate_chars(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }

    let mut truncated = text.chars().take(cap.saturating_sub(3)).collect::<String>();
    truncated.push_str("...");
    truncated
}
