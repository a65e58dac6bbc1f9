//! Configuration-driven selection of a fragment source.
//!
//! ```rust
//! use sprovider::{ProviderConfig, ProviderKind, create_fragment_source};
//!
//! let source = create_fragment_source(&ProviderConfig::scripted(["Hel", "lo"]))
//!     .expect("scripted source needs no credentials");
//! assert_eq!(source.kind(), ProviderKind::Scripted);
//! ```

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{FragmentSource, ProviderError, ScriptedFragmentSource, SecretString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    OpenAiCompatible,
    Anthropic,
    Scripted,
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let id = match self {
            Self::OpenAiCompatible => "openai-compatible",
            Self::Anthropic => "anthropic",
            Self::Scripted => "scripted",
        };

        f.write_str(id)
    }
}

impl ProviderKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai-compatible" | "openai_compatible" => Some(Self::OpenAiCompatible),
            "anthropic" | "claude" => Some(Self::Anthropic),
            "scripted" | "static" => Some(Self::Scripted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub max_output_tokens: u32,
    pub request_timeout: Option<Duration>,
    pub scripted_fragments: Vec<String>,
}

impl ProviderConfig {
    pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1024;

    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            base_url: None,
            api_key: None,
            max_output_tokens: Self::DEFAULT_MAX_OUTPUT_TOKENS,
            request_timeout: None,
            scripted_fragments: Vec::new(),
        }
    }

    pub fn openai_compatible(api_key: impl Into<String>) -> Self {
        Self::new(ProviderKind::OpenAiCompatible).with_api_key(api_key)
    }

    pub fn anthropic(api_key: impl Into<String>) -> Self {
        Self::new(ProviderKind::Anthropic).with_api_key(api_key)
    }

    pub fn scripted<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Self::new(ProviderKind::Scripted);
        config.scripted_fragments = fragments.into_iter().map(Into::into).collect();
        config
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(api_key));
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    #[cfg(any(feature = "provider-openai-compatible", feature = "provider-anthropic"))]
    fn require_api_key(&self) -> Result<SecretString, ProviderError> {
        match &self.api_key {
            Some(key) if !key.is_empty() => Ok(key.clone()),
            _ => Err(ProviderError::authentication(format!(
                "no api key configured for {} provider",
                self.kind
            ))),
        }
    }

    #[cfg(any(feature = "provider-openai-compatible", feature = "provider-anthropic"))]
    fn http_client(&self) -> Result<reqwest::Client, ProviderError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }

        builder
            .build()
            .map_err(|error| ProviderError::other(format!("failed to build http client: {error}")))
    }
}

pub fn create_fragment_source(
    config: &ProviderConfig,
) -> Result<Arc<dyn FragmentSource>, ProviderError> {
    if config.max_output_tokens == 0 {
        return Err(ProviderError::invalid_request(
            "max_output_tokens must be greater than zero",
        ));
    }

    match config.kind {
        ProviderKind::Scripted => Ok(Arc::new(ScriptedFragmentSource::new(
            config.scripted_fragments.clone(),
        ))),
        #[cfg(feature = "provider-openai-compatible")]
        ProviderKind::OpenAiCompatible => {
            let mut source = crate::adapters::openai_compatible::OpenAiCompatibleSource::new(
                config.http_client()?,
                config.require_api_key()?,
            )
            .with_max_output_tokens(config.max_output_tokens);
            if let Some(base_url) = &config.base_url {
                source = source.with_base_url(base_url.clone());
            }
            Ok(Arc::new(source))
        }
        #[cfg(feature = "provider-anthropic")]
        ProviderKind::Anthropic => {
            let mut source = crate::adapters::anthropic::AnthropicSource::new(
                config.http_client()?,
                config.require_api_key()?,
            )
            .with_max_output_tokens(config.max_output_tokens);
            if let Some(base_url) = &config.base_url {
                source = source.with_base_url(base_url.clone());
            }
            Ok(Arc::new(source))
        }
        #[allow(unreachable_patterns)]
        other => Err(ProviderError::invalid_request(format!(
            "{other} provider support is not compiled in"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parse_supports_aliases() {
        assert_eq!(ProviderKind::parse("openai"), Some(ProviderKind::OpenAiCompatible));
        assert_eq!(ProviderKind::parse("Claude"), Some(ProviderKind::Anthropic));
        assert_eq!(ProviderKind::parse("static"), Some(ProviderKind::Scripted));
        assert_eq!(ProviderKind::parse("bedrock"), None);
    }

    #[test]
    fn scripted_config_builds_without_credentials() {
        let source = create_fragment_source(&ProviderConfig::scripted(["a"])).expect("source");
        assert_eq!(source.kind(), ProviderKind::Scripted);
    }

    #[test]
    fn zero_output_tokens_are_rejected() {
        let config = ProviderConfig::scripted(["a"]).with_max_output_tokens(0);
        let error = create_fragment_source(&config).err().expect("should fail");
        assert_eq!(error.kind, crate::ProviderErrorKind::InvalidRequest);
    }

    #[cfg(feature = "provider-openai-compatible")]
    #[test]
    fn http_variants_require_api_key() {
        let error = create_fragment_source(&ProviderConfig::new(ProviderKind::OpenAiCompatible))
            .err()
            .expect("missing key should fail");
        assert_eq!(error.kind, crate::ProviderErrorKind::Authentication);
        assert!(!error.retryable);
    }

    #[cfg(feature = "provider-anthropic")]
    #[test]
    fn anthropic_variant_is_selected_by_kind() {
        let source = create_fragment_source(
            &ProviderConfig::anthropic("sk-ant-test").with_base_url("http://127.0.0.1:9"),
        )
        .expect("source");
        assert_eq!(source.kind(), ProviderKind::Anthropic);
    }
}
