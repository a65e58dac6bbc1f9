//! Anthropic messages API streaming.

use std::sync::Arc;

use reqwest::Client;
use scommon::BoxFuture;
use serde::{Deserialize, Serialize};

use super::http::{
    HttpAuth, HttpRequest, HttpTransport, ReqwestTransport, endpoint, open_stream, to_body,
};
use super::sse::{SseStep, fragments_from_bytes};
use crate::{FragmentSource, FragmentStream, ProviderError, ProviderKind, SecretString};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicSource {
    transport: Arc<dyn HttpTransport>,
    api_key: SecretString,
    base_url: String,
    max_output_tokens: u32,
}

impl AnthropicSource {
    pub fn new(client: Client, api_key: SecretString) -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::new(client)), api_key)
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>, api_key: SecretString) -> Self {
        Self {
            transport,
            api_key,
            base_url: ANTHROPIC_BASE_URL.to_string(),
            max_output_tokens: crate::ProviderConfig::DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

impl FragmentSource for AnthropicSource {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn stream<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<FragmentStream<'a>, ProviderError>> {
        Box::pin(async move {
            let body = MessagesRequest {
                model,
                max_tokens: self.max_output_tokens,
                messages: vec![MessagesTurn {
                    role: "user",
                    content: prompt,
                }],
                stream: true,
            };

            let request = HttpRequest {
                url: endpoint(&self.base_url, "messages"),
                auth: HttpAuth::Header("x-api-key", self.api_key.clone()),
                headers: vec![("anthropic-version", ANTHROPIC_VERSION.to_string())],
                body: to_body(&body)?,
            };

            let bytes = open_stream(self.transport.as_ref(), request, "Anthropic").await?;
            Ok(fragments_from_bytes(bytes, interpret_event))
        })
    }
}

/// Interprets one `data:` payload of a messages stream. Event types other than
/// text deltas, stop and error carry no text and are skipped.
pub fn interpret_event(payload: &str) -> Result<SseStep, ProviderError> {
    let event: StreamEvent = serde_json::from_str(payload)
        .map_err(|err| ProviderError::stream(format!("malformed event: {err}")))?;

    match event.kind.as_str() {
        "content_block_delta" => {
            let text = event.delta.and_then(|delta| delta.text).unwrap_or_default();
            if text.is_empty() {
                Ok(SseStep::Skip)
            } else {
                Ok(SseStep::Fragment(text))
            }
        }
        "message_stop" => Ok(SseStep::Done),
        "error" => {
            let message = event
                .error
                .map(|error| error.message)
                .unwrap_or_else(|| "stream reported an error".to_string());
            Err(ProviderError::stream(message))
        }
        _ => Ok(SseStep::Skip),
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<MessagesTurn<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct MessagesTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    delta: Option<EventDelta>,
    error: Option<EventError>,
}

#[derive(Debug, Deserialize)]
struct EventDelta {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventError {
    message: String,
}
