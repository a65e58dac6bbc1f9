//! Prompt preparation for investigation turns.
//!
//! [`prepare`] turns a [`scommon::Turn`] and a [`PromptConfig`] into a
//! [`PreparedPrompt`]: sensitive values are redacted, older history is folded
//! into an extractive summary, and the whole prompt is kept inside the token
//! budget.
//!
//! ```rust
//! use scommon::{Turn, Utterance};
//! use sprompt::{PromptConfig, prepare};
//!
//! let turn = Turn::new("conv-1", 2, "Which hosts returned 502s?")
//!     .with_history(vec![Utterance::user("Look at the edge proxies")]);
//! let prepared = prepare(&turn, &PromptConfig::default()).expect("prompt should prepare");
//!
//! assert!(prepared.composite.contains("Which hosts returned 502s?"));
//! assert!(prepared.budget.is_within_limit());
//! ```

mod budget;
mod config;
mod error;
mod history;
mod language;
mod prepare;
mod redact;

pub use budget::TokenBudget;
pub use config::{DEFAULT_SYSTEM_INSTRUCTION, PromptConfig};
pub use error::{PromptError, PromptErrorKind};
pub use language::{Language, detect_language};
pub use prepare::{CURRENT_REQUEST_HEADER, PreparedPrompt, prepare};
pub use redact::{RedactionCategory, SafetyRecord, redact};

pub mod prelude {
    pub use crate::{
        Language, PreparedPrompt, PromptConfig, PromptError, PromptErrorKind, SafetyRecord,
        TokenBudget, prepare,
    };
}
