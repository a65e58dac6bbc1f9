//! Delivery Port: pushes one wire message to one addressable recipient.

mod channel;
mod http;

use std::error::Error;
use std::fmt::{Display, Formatter};

use scommon::{BoxFuture, RetryableError};

use crate::WireMessage;

pub use channel::{ChannelDelivery, DEFAULT_INBOX_CAPACITY};
pub use http::{DEFAULT_CALLBACK_TIMEOUT, HttpCallbackDelivery};

/// Opaque address of a live recipient, e.g. a connection identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryTarget(String);

impl DeliveryTarget {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for DeliveryTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeliveryTarget {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DeliveryTarget {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryErrorKind {
    /// The recipient no longer exists. Never retried.
    Gone,
    Transient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryError {
    pub kind: DeliveryErrorKind,
    pub message: String,
}

impl DeliveryError {
    pub fn new(kind: DeliveryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn gone(message: impl Into<String>) -> Self {
        Self::new(DeliveryErrorKind::Gone, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(DeliveryErrorKind::Transient, message)
    }

    pub fn is_gone(&self) -> bool {
        self.kind == DeliveryErrorKind::Gone
    }
}

impl Display for DeliveryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for DeliveryError {}

impl RetryableError for DeliveryError {
    fn is_retryable(&self) -> bool {
        self.kind == DeliveryErrorKind::Transient
    }

    fn kind_label(&self) -> &'static str {
        match self.kind {
            DeliveryErrorKind::Gone => "gone",
            DeliveryErrorKind::Transient => "transient",
        }
    }
}

pub trait DeliveryPort: Send + Sync {
    /// One attempt; callers own retry.
    fn send<'a>(
        &'a self,
        target: &'a DeliveryTarget,
        message: &'a WireMessage,
    ) -> BoxFuture<'a, Result<(), DeliveryError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gone_is_never_retryable() {
        assert!(!DeliveryError::gone("closed").is_retryable());
        assert!(DeliveryError::transient("busy").is_retryable());
        assert_eq!(DeliveryError::gone("closed").kind_label(), "gone");
    }

    #[test]
    fn target_displays_raw_identifier() {
        let target = DeliveryTarget::from("conn-7");
        assert_eq!(target.to_string(), "conn-7");
        assert_eq!(target.as_str(), "conn-7");
    }
}
