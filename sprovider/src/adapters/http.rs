//! HTTP transport seam and status-code classification shared by the HTTP fragment sources.

use std::pin::Pin;

use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use scommon::BoxFuture;
use serde::Deserialize;

use crate::{ProviderError, SecretString};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ProviderError>> + Send>>;

/// Credential attached to an outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpAuth {
    Bearer(SecretString),
    Header(&'static str, SecretString),
}

/// A JSON POST whose response body is consumed as a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub auth: HttpAuth,
    pub headers: Vec<(&'static str, String)>,
    pub body: serde_json::Value,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub struct HttpReply {
    pub status: u16,
    pub body: ByteStream,
}

impl std::fmt::Debug for HttpReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReply")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

pub trait HttpTransport: Send + Sync + std::fmt::Debug {
    fn post_stream<'a>(
        &'a self,
        request: HttpRequest,
    ) -> BoxFuture<'a, Result<HttpReply, ProviderError>>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn post_stream<'a>(
        &'a self,
        request: HttpRequest,
    ) -> BoxFuture<'a, Result<HttpReply, ProviderError>> {
        Box::pin(async move {
            let mut builder = self.client.post(&request.url);
            builder = match &request.auth {
                HttpAuth::Bearer(token) => builder.bearer_auth(token.expose()),
                HttpAuth::Header(name, value) => builder.header(*name, value.expose()),
            };
            for (name, value) in &request.headers {
                builder = builder.header(*name, value.as_str());
            }

            let response = builder.json(&request.body).send().await.map_err(send_error)?;
            let status = response.status().as_u16();
            let body = response.bytes_stream().map(|item| {
                item.map(|bytes| bytes.to_vec())
                    .map_err(|error| ProviderError::stream(error.to_string()))
            });

            Ok(HttpReply {
                status,
                body: Box::pin(body),
            })
        })
    }
}

/// Sends `request` and hands back the body of a 2xx reply; any other status is
/// drained and classified.
pub(crate) async fn open_stream(
    transport: &dyn HttpTransport,
    request: HttpRequest,
    provider: &str,
) -> Result<ByteStream, ProviderError> {
    let reply = transport.post_stream(request).await?;
    if (200..300).contains(&reply.status) {
        return Ok(reply.body);
    }

    Err(error_from_reply(reply, provider).await)
}

async fn error_from_reply(reply: HttpReply, provider: &str) -> ProviderError {
    let mut body = reply.body;
    let mut bytes = Vec::new();
    while let Some(Ok(chunk)) = body.next().await {
        bytes.extend_from_slice(&chunk);
    }

    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = extract_error_message(&String::from_utf8_lossy(&bytes))
        .unwrap_or_else(|| format!("{provider} request failed with status {status}"));

    classify_status(status, message)
}

pub(crate) fn to_body<T: serde::Serialize>(body: &T) -> Result<serde_json::Value, ProviderError> {
    serde_json::to_value(body)
        .map_err(|error| ProviderError::invalid_request(format!("unencodable request: {error}")))
}

pub(crate) fn classify_status(status: StatusCode, message: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::authentication(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderError::timeout(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ProviderError::invalid_request(message)
        }
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
            ProviderError::unavailable(message)
        }
        _ => ProviderError::transport(message),
    }
}

pub(crate) fn send_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::timeout(error.to_string())
    } else {
        ProviderError::transport(error.to_string())
    }
}

pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok()?;
    Some(parsed.error.message)
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProviderErrorKind;

    #[test]
    fn status_codes_map_to_error_kinds() {
        let cases = [
            (StatusCode::UNAUTHORIZED, ProviderErrorKind::Authentication, false),
            (StatusCode::FORBIDDEN, ProviderErrorKind::Authentication, false),
            (StatusCode::TOO_MANY_REQUESTS, ProviderErrorKind::RateLimited, true),
            (StatusCode::GATEWAY_TIMEOUT, ProviderErrorKind::Timeout, true),
            (StatusCode::UNPROCESSABLE_ENTITY, ProviderErrorKind::InvalidRequest, false),
            (StatusCode::BAD_GATEWAY, ProviderErrorKind::Unavailable, true),
            (StatusCode::INTERNAL_SERVER_ERROR, ProviderErrorKind::Transport, true),
        ];

        for (status, kind, retryable) in cases {
            let error = classify_status(status, "x".to_string());
            assert_eq!(error.kind, kind, "status {status}");
            assert_eq!(error.retryable, retryable, "status {status}");
        }
    }

    #[test]
    fn error_message_is_pulled_from_json_envelope() {
        let body = r#"{"error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(extract_error_message(body).as_deref(), Some("Overloaded"));
        assert_eq!(extract_error_message("<html>"), None);
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(endpoint("http://host/v1/", "messages"), "http://host/v1/messages");
    }
}
