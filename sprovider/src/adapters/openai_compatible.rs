//! Chat-completions streaming over any OpenAI-compatible endpoint.

use std::sync::Arc;

use reqwest::Client;
use scommon::BoxFuture;
use serde::{Deserialize, Serialize};

use super::http::{
    HttpAuth, HttpRequest, HttpTransport, ReqwestTransport, endpoint, open_stream, to_body,
};
use super::sse::{SseStep, fragments_from_bytes};
use crate::{FragmentSource, FragmentStream, ProviderError, ProviderKind, SecretString};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleSource {
    transport: Arc<dyn HttpTransport>,
    api_key: SecretString,
    base_url: String,
    max_output_tokens: u32,
}

impl OpenAiCompatibleSource {
    pub fn new(client: Client, api_key: SecretString) -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::new(client)), api_key)
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>, api_key: SecretString) -> Self {
        Self {
            transport,
            api_key,
            base_url: OPENAI_BASE_URL.to_string(),
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

impl FragmentSource for OpenAiCompatibleSource {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAiCompatible
    }

    fn stream<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<FragmentStream<'a>, ProviderError>> {
        Box::pin(async move {
            let body = ChatRequest {
                model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                stream: true,
                max_tokens: self.max_output_tokens,
            };

            let request = HttpRequest {
                url: endpoint(&self.base_url, "chat/completions"),
                auth: HttpAuth::Bearer(self.api_key.clone()),
                headers: Vec::new(),
                body: to_body(&body)?,
            };

            let bytes = open_stream(self.transport.as_ref(), request, "OpenAI-compatible").await?;
            Ok(fragments_from_bytes(bytes, interpret_chunk))
        })
    }
}

/// Interprets one `data:` payload of a chat-completions stream.
pub fn interpret_chunk(payload: &str) -> Result<SseStep, ProviderError> {
    if payload == "[DONE]" {
        return Ok(SseStep::Done);
    }

    let parsed: ChatChunk = serde_json::from_str(payload)
        .map_err(|err| ProviderError::stream(format!("malformed chunk: {err}")))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .unwrap_or_default();

    if content.is_empty() {
        Ok(SseStep::Skip)
    } else {
        Ok(SseStep::Fragment(content))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDelta {
    content: Option<String>,
}
