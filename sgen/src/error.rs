//! Generation-run errors and conversions from collaborating crates.

use std::error::Error;
use std::fmt::{Display, Formatter};

use sledger::{LedgerError, LedgerErrorKind};
use sprompt::{PromptError, PromptErrorKind};
use sprovider::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    Validation,
    GenerationFailed,
    /// Primary ledger write failed; retry the whole call with the same message id.
    Storage,
    InvalidConfig,
}

impl GenerationErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::GenerationFailed => "generation_failed",
            Self::Storage => "storage",
            Self::InvalidConfig => "invalid_config",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::Validation, message)
    }

    pub fn generation_failed(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::GenerationFailed, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::Storage, message)
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::InvalidConfig, message)
    }
}

impl Display for GenerationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for GenerationError {}

impl From<ProviderError> for GenerationError {
    fn from(value: ProviderError) -> Self {
        GenerationError::generation_failed(value.to_string())
    }
}

impl From<PromptError> for GenerationError {
    fn from(value: PromptError) -> Self {
        match value.kind {
            PromptErrorKind::Validation => GenerationError::validation(value.message),
            PromptErrorKind::InvalidConfig => GenerationError::invalid_config(value.message),
        }
    }
}

impl From<LedgerError> for GenerationError {
    fn from(value: LedgerError) -> Self {
        match value.kind {
            LedgerErrorKind::InvalidRequest => GenerationError::validation(value.message),
            LedgerErrorKind::Storage | LedgerErrorKind::NotFound => {
                GenerationError::storage(value.message)
            }
        }
    }
}
