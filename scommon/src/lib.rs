//! Shared identifiers, turn types, token estimation, and retry primitives for workspace crates.
//!
//! ```rust
//! use scommon::{ConversationId, MessageId, Role, Turn, Utterance, estimate_tokens};
//!
//! let turn = Turn::new("conv-1", 3, "Where did the login spike come from?")
//!     .with_history(vec![Utterance::new(Role::User, "Show me yesterday's alerts")]);
//! let message_id = MessageId::new("msg-1");
//!
//! assert_eq!(turn.conversation_id, ConversationId::from("conv-1"));
//! assert_eq!(message_id.as_str(), "msg-1");
//! assert_eq!(estimate_tokens("abcdefgh", 4.0), 2);
//! ```

mod retry;

pub mod future {
    //! Shared async future aliases.
    //!
    //! ```rust
    //! use scommon::BoxFuture;
    //!
    //! fn str_len<'a>(value: &'a str) -> BoxFuture<'a, usize> {
    //!     Box::pin(async move { value.len() })
    //! }
    //!
    //! let _future = str_len("hello");
    //! ```

    use std::future::Future;
    use std::pin::Pin;

    pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
}

pub mod context {
    //! Conversation and message identifier newtypes.
    //!
    //! ```rust
    //! use scommon::{ConversationId, MessageId};
    //!
    //! let conversation = ConversationId::new("conv-42");
    //! let generated = MessageId::generate();
    //!
    //! assert_eq!(conversation.to_string(), "conv-42");
    //! assert!(!generated.as_str().is_empty());
    //! ```

    use std::collections::HashMap;
    use std::fmt::{Display, Formatter};

    use serde::{Deserialize, Serialize};

    pub type MetadataMap = HashMap<String, String>;

    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ConversationId(String);

    impl ConversationId {
        pub fn new(value: impl Into<String>) -> Self {
            Self(value.into())
        }

        pub fn as_str(&self) -> &str {
            self.0.as_str()
        }

        pub fn is_blank(&self) -> bool {
            self.0.trim().is_empty()
        }
    }

    impl Display for ConversationId {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl From<String> for ConversationId {
        fn from(value: String) -> Self {
            Self(value)
        }
    }

    impl From<&str> for ConversationId {
        fn from(value: &str) -> Self {
            Self(value.to_string())
        }
    }

    /// Opaque identifier of one generation run and of the message it finalizes.
    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct MessageId(String);

    impl MessageId {
        pub fn new(value: impl Into<String>) -> Self {
            Self(value.into())
        }

        pub fn generate() -> Self {
            Self(uuid::Uuid::new_v4().to_string())
        }

        pub fn as_str(&self) -> &str {
            self.0.as_str()
        }

        pub fn is_blank(&self) -> bool {
            self.0.trim().is_empty()
        }
    }

    impl Display for MessageId {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl From<String> for MessageId {
        fn from(value: String) -> Self {
            Self(value)
        }
    }

    impl From<&str> for MessageId {
        fn from(value: &str) -> Self {
            Self(value.to_string())
        }
    }
}

pub mod model {
    //! Role-tagged utterances, inbound turns, and token usage.
    //!
    //! ```rust
    //! use scommon::{Role, TokenUsage, Turn};
    //!
    //! let turn = Turn::new("conv-1", 1, "hello");
    //! let usage = TokenUsage::new(12, 30);
    //!
    //! assert!(turn.history.is_empty());
    //! assert_eq!(usage.total(), 42);
    //! assert_eq!(Role::parse("Assistant"), Some(Role::Assistant));
    //! ```

    use std::fmt::{Display, Formatter};

    use serde::{Deserialize, Serialize};

    use crate::ConversationId;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        User,
        Assistant,
        System,
    }

    impl Role {
        pub const ALL: [Role; 3] = [Role::User, Role::Assistant, Role::System];

        pub fn as_str(self) -> &'static str {
            match self {
                Self::User => "user",
                Self::Assistant => "assistant",
                Self::System => "system",
            }
        }

        pub fn parse(value: &str) -> Option<Self> {
            match value.trim().to_ascii_lowercase().as_str() {
                "user" | "human" => Some(Self::User),
                "assistant" | "ai" | "bot" => Some(Self::Assistant),
                "system" => Some(Self::System),
                _ => None,
            }
        }
    }

    impl Display for Role {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.as_str())
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Utterance {
        pub role: Role,
        pub text: String,
    }

    impl Utterance {
        pub fn new(role: Role, text: impl Into<String>) -> Self {
            Self {
                role,
                text: text.into(),
            }
        }

        pub fn user(text: impl Into<String>) -> Self {
            Self::new(Role::User, text)
        }

        pub fn assistant(text: impl Into<String>) -> Self {
            Self::new(Role::Assistant, text)
        }

        pub fn system(text: impl Into<String>) -> Self {
            Self::new(Role::System, text)
        }
    }

    /// One inbound user request. Never persisted itself.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Turn {
        pub conversation_id: ConversationId,
        pub sequence: u64,
        pub text: String,
        pub history: Vec<Utterance>,
    }

    impl Turn {
        pub fn new(
            conversation_id: impl Into<ConversationId>,
            sequence: u64,
            text: impl Into<String>,
        ) -> Self {
            Self {
                conversation_id: conversation_id.into(),
                sequence,
                text: text.into(),
                history: Vec::new(),
            }
        }

        pub fn with_history(mut self, history: Vec<Utterance>) -> Self {
            self.history = history;
            self
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct TokenUsage {
        pub input_tokens: u32,
        pub output_tokens: u32,
    }

    impl TokenUsage {
        pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
            Self {
                input_tokens,
                output_tokens,
            }
        }

        pub fn total(&self) -> u32 {
            self.input_tokens.saturating_add(self.output_tokens)
        }
    }
}

pub mod tokens {
    //! Deterministic character-ratio token estimation.
    //!
    //! ```rust
    //! use scommon::estimate_tokens;
    //!
    //! assert_eq!(estimate_tokens("", 4.0), 0);
    //! assert_eq!(estimate_tokens("abcde", 4.0), 2);
    //! ```

    /// Estimates `ceil(chars / tokens_per_char)`.
    ///
    /// Characters are Unicode scalar values. A non-positive or non-finite ratio counts one
    /// token per character.
    pub fn estimate_tokens(text: &str, tokens_per_char: f64) -> u32 {
        let chars = text.chars().count();
        if chars == 0 {
            return 0;
        }

        let ratio = if tokens_per_char.is_finite() && tokens_per_char > 0.0 {
            tokens_per_char
        } else {
            1.0
        };

        let estimate = (chars as f64 / ratio).ceil();
        if estimate >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            estimate as u32
        }
    }

    /// Largest character count whose estimate stays within `tokens`.
    pub fn chars_for_tokens(tokens: u32, tokens_per_char: f64) -> usize {
        let ratio = if tokens_per_char.is_finite() && tokens_per_char > 0.0 {
            tokens_per_char
        } else {
            1.0
        };

        (f64::from(tokens) * ratio).floor() as usize
    }
}

pub use context::{ConversationId, MessageId, MetadataMap};
pub use future::BoxFuture;
pub use model::{Role, TokenUsage, Turn, Utterance};
pub use retry::{
    NoopRetryHooks, NoopSleeper, RetryHooks, RetryPolicy, RetryableError, Sleeper, TimerSleeper,
    execute_with_retry,
};
pub use tokens::{chars_for_tokens, estimate_tokens};

#[cfg(test)]
mod tests {
    use super::{
        ConversationId, MessageId, Role, TokenUsage, Turn, Utterance, chars_for_tokens,
        estimate_tokens,
    };

    #[test]
    fn id_newtypes_round_trip_strings() {
        let conversation = ConversationId::new("conv-1");
        let message = MessageId::from("msg-1");

        assert_eq!(conversation.as_str(), "conv-1");
        assert_eq!(message.as_str(), "msg-1");
        assert_eq!(conversation.to_string(), "conv-1");
        assert_eq!(message.to_string(), "msg-1");
        assert!(ConversationId::new("  ").is_blank());
    }

    #[test]
    fn generated_message_ids_are_unique() {
        let first = MessageId::generate();
        let second = MessageId::generate();

        assert_ne!(first, second);
        assert!(!first.is_blank());
    }

    #[test]
    fn role_parse_accepts_aliases_and_rejects_unknown() {
        assert_eq!(Role::parse("USER"), Some(Role::User));
        assert_eq!(Role::parse("ai"), Some(Role::Assistant));
        assert_eq!(Role::parse(" system "), Some(Role::System));
        assert_eq!(Role::parse("tool"), None);
    }

    #[test]
    fn turn_builder_sets_history() {
        let turn = Turn::new("conv-2", 7, "what changed?")
            .with_history(vec![Utterance::user("hi"), Utterance::assistant("hello")]);

        assert_eq!(turn.sequence, 7);
        assert_eq!(turn.history.len(), 2);
        assert_eq!(turn.history[1].role, Role::Assistant);
    }

    #[test]
    fn token_estimate_rounds_up_and_counts_chars_not_bytes() {
        assert_eq!(estimate_tokens("abcd", 4.0), 1);
        assert_eq!(estimate_tokens("abcde", 4.0), 2);
        assert_eq!(estimate_tokens("ñññññ", 4.0), 2);
        assert_eq!(estimate_tokens("abc", 0.0), 3);
        assert_eq!(TokenUsage::new(3, 4).total(), 7);
    }

    #[test]
    fn chars_for_tokens_never_exceeds_budget() {
        for tokens in [0_u32, 1, 7, 100] {
            for ratio in [1.0, 3.5, 4.0] {
                let chars = chars_for_tokens(tokens, ratio);
                let text = "x".repeat(chars);
                assert!(estimate_tokens(&text, ratio) <= tokens);
            }
        }
    }
}
