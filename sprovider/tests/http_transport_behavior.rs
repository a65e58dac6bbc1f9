#![cfg(all(feature = "provider-openai-compatible", feature = "provider-anthropic"))]

use std::sync::{Arc, Mutex};

use futures_util::{StreamExt, stream};
use scommon::BoxFuture;
use sprovider::adapters::anthropic::{ANTHROPIC_VERSION, AnthropicSource};
use sprovider::adapters::http::{HttpAuth, HttpReply, HttpRequest, HttpTransport};
use sprovider::adapters::openai_compatible::OpenAiCompatibleSource;
use sprovider::{FragmentSource, ProviderError, ProviderErrorKind, SecretString};

#[derive(Debug)]
struct FakeTransport {
    status: u16,
    chunks: Vec<&'static str>,
    captured: Mutex<Option<HttpRequest>>,
}

impl FakeTransport {
    fn replying(status: u16, chunks: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            status,
            chunks,
            captured: Mutex::new(None),
        })
    }

    fn captured(&self) -> HttpRequest {
        self.captured
            .lock()
            .expect("captured lock")
            .clone()
            .expect("a request was sent")
    }
}

impl HttpTransport for FakeTransport {
    fn post_stream<'a>(
        &'a self,
        request: HttpRequest,
    ) -> BoxFuture<'a, Result<HttpReply, ProviderError>> {
        Box::pin(async move {
            *self.captured.lock().expect("captured lock") = Some(request);
            let chunks = self
                .chunks
                .iter()
                .map(|chunk| Ok::<_, ProviderError>(chunk.as_bytes().to_vec()))
                .collect::<Vec<_>>();

            Ok(HttpReply {
                status: self.status,
                body: Box::pin(stream::iter(chunks)),
            })
        })
    }
}

async fn collect(source: &dyn FragmentSource) -> Result<Vec<String>, ProviderError> {
    let mut stream = source.stream("model-x", "Where is the leak?").await?;
    let mut fragments = Vec::new();
    while let Some(fragment) = stream.next().await {
        fragments.push(fragment?);
    }
    Ok(fragments)
}

#[tokio::test]
async fn openai_compatible_posts_chat_request_with_bearer_auth() {
    let transport = FakeTransport::replying(
        200,
        vec![
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choices\":[{\"delta\":",
            "{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n\n",
        ],
    );
    let source = OpenAiCompatibleSource::with_transport(
        transport.clone(),
        SecretString::new("sk-live-123"),
    )
    .with_base_url("http://gateway.test/v1/")
    .with_max_output_tokens(256);

    assert_eq!(collect(&source).await, Ok(vec!["Hel".to_string(), "lo".to_string()]));

    let request = transport.captured();
    assert_eq!(request.url, "http://gateway.test/v1/chat/completions");
    assert_eq!(request.auth, HttpAuth::Bearer(SecretString::new("sk-live-123")));
    assert_eq!(
        request.body,
        serde_json::json!({
            "model": "model-x",
            "messages": [{"role": "user", "content": "Where is the leak?"}],
            "stream": true,
            "max_tokens": 256,
        })
    );
}

#[tokio::test]
async fn anthropic_posts_messages_request_with_key_and_version_headers() {
    let transport = FakeTransport::replying(
        200,
        vec![
            "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"m1\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        ],
    );
    let source = AnthropicSource::with_transport(transport.clone(), SecretString::new("sk-ant-1"))
        .with_base_url("http://anthropic.test/v1")
        .with_max_output_tokens(512);

    assert_eq!(collect(&source).await, Ok(vec!["Hel".to_string(), "lo".to_string()]));

    let request = transport.captured();
    assert_eq!(request.url, "http://anthropic.test/v1/messages");
    assert_eq!(
        request.auth,
        HttpAuth::Header("x-api-key", SecretString::new("sk-ant-1"))
    );
    assert_eq!(request.header("anthropic-version"), Some(ANTHROPIC_VERSION));
    assert_eq!(
        request.body,
        serde_json::json!({
            "model": "model-x",
            "max_tokens": 512,
            "messages": [{"role": "user", "content": "Where is the leak?"}],
            "stream": true,
        })
    );
}

#[tokio::test]
async fn non_success_status_maps_to_error_kind_with_envelope_message() {
    let cases = [
        (401, ProviderErrorKind::Authentication, false),
        (429, ProviderErrorKind::RateLimited, true),
        (422, ProviderErrorKind::InvalidRequest, false),
        (503, ProviderErrorKind::Unavailable, true),
        (504, ProviderErrorKind::Timeout, true),
        (500, ProviderErrorKind::Transport, true),
    ];

    for (status, kind, retryable) in cases {
        let body = vec!["{\"error\":{\"type\":\"x\",", "\"message\":\"upstream said no\"}}"];
        let openai = OpenAiCompatibleSource::with_transport(
            FakeTransport::replying(status, body.clone()),
            SecretString::new("sk"),
        );
        let anthropic = AnthropicSource::with_transport(
            FakeTransport::replying(status, body),
            SecretString::new("sk"),
        );

        for source in [&openai as &dyn FragmentSource, &anthropic] {
            let error = collect(source).await.expect_err("non-2xx fails on open");
            assert_eq!(error.kind, kind, "status {status}");
            assert_eq!(error.retryable, retryable, "status {status}");
            assert_eq!(error.message, "upstream said no", "status {status}");
        }
    }
}

#[tokio::test]
async fn non_json_error_body_falls_back_to_status_message() {
    let source = AnthropicSource::with_transport(
        FakeTransport::replying(502, vec!["<html>bad gateway</html>"]),
        SecretString::new("sk"),
    );

    let error = collect(&source).await.expect_err("bad gateway");
    assert_eq!(error.kind, ProviderErrorKind::Unavailable);
    assert!(error.message.contains("Anthropic request failed with status 502"));
}

#[tokio::test]
async fn malformed_payload_mid_stream_surfaces_as_stream_error() {
    let source = OpenAiCompatibleSource::with_transport(
        FakeTransport::replying(
            200,
            vec!["data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\ndata: {oops\n\n"],
        ),
        SecretString::new("sk"),
    );

    let mut stream = source.stream("model-x", "prompt").await.expect("opens");
    assert_eq!(stream.next().await, Some(Ok("ok".to_string())));
    let error = stream
        .next()
        .await
        .expect("an item")
        .expect_err("malformed chunk");
    assert_eq!(error.kind, ProviderErrorKind::Stream);
}
