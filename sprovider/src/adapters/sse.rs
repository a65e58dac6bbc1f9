//! Incremental server-sent-events decoding shared by the HTTP variants.
//!
//! ```rust
//! use sprovider::adapters::sse::SseLineBuffer;
//!
//! let mut buffer = SseLineBuffer::default();
//! assert!(buffer.push(b"data: {\"a\"").is_empty());
//! assert_eq!(buffer.push(b":1}\n\n"), vec!["{\"a\":1}".to_string()]);
//! ```

use std::pin::Pin;

use async_stream::try_stream;
use futures_core::Stream;
use futures_util::StreamExt;

use crate::ProviderError;

/// Outcome of interpreting one `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseStep {
    Fragment(String),
    Skip,
    Done,
}

/// Splits raw bytes into `data:` payloads. Lines are cut on `\n` before decoding,
/// so multi-byte characters split across network chunks survive intact.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut payloads = Vec::new();

        while let Some(newline_index) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line = self.pending.drain(..=newline_index).collect::<Vec<u8>>();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }

        payloads
    }

    /// Flushes a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.pending);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }

    Some(payload.to_string())
}

/// Turns a byte stream into fragments using a variant-specific payload interpreter.
pub fn fragments_from_bytes<'a, S, B, E, F>(
    chunks: S,
    mut interpret: F,
) -> Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send + 'a>>
where
    S: Stream<Item = Result<B, E>> + Send + 'a,
    B: AsRef<[u8]> + Send + 'a,
    E: std::fmt::Display + Send + 'a,
    F: FnMut(&str) -> Result<SseStep, ProviderError> + Send + 'a,
{
    Box::pin(try_stream! {
        let mut chunks = Box::pin(chunks);
        let mut buffer = SseLineBuffer::default();
        let mut finished = false;

        while let Some(item) = chunks.next().await {
            let bytes = item.map_err(|err| ProviderError::stream(err.to_string()))?;
            for payload in buffer.push(bytes.as_ref()) {
                match interpret(&payload)? {
                    SseStep::Fragment(text) => yield text,
                    SseStep::Skip => {}
                    SseStep::Done => {
                        finished = true;
                        break;
                    }
                }
            }

            if finished {
                break;
            }
        }

        if !finished {
            if let Some(payload) = buffer.finish() {
                if let SseStep::Fragment(text) = interpret(&payload)? {
                    yield text;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use futures_util::stream;

    use super::*;

    #[test]
    fn buffer_ignores_comments_and_event_lines() {
        let mut buffer = SseLineBuffer::default();
        let payloads = buffer.push(b": keep-alive\nevent: ping\ndata: one\n\ndata: two\n");
        assert_eq!(payloads, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn buffer_rejoins_multibyte_characters_split_across_chunks() {
        let bytes = "data: caf\u{e9}\n".as_bytes();
        let split = bytes.len() - 2;
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(&bytes[..split]).is_empty());
        assert_eq!(buffer.push(&bytes[split..]), vec!["caf\u{e9}".to_string()]);
    }

    #[tokio::test]
    async fn fragments_stop_at_done_marker() {
        let chunks = stream::iter(vec![
            Ok::<_, String>(b"data: a\ndata: ".to_vec()),
            Ok(b"b\ndata: [DONE]\ndata: c\n".to_vec()),
        ]);

        let fragments = fragments_from_bytes(chunks, |payload| {
            Ok(if payload == "[DONE]" {
                SseStep::Done
            } else {
                SseStep::Fragment(payload.to_string())
            })
        })
        .collect::<Vec<_>>()
        .await;

        assert_eq!(fragments, vec![Ok("a".to_string()), Ok("b".to_string())]);
    }

    #[tokio::test]
    async fn transport_error_surfaces_as_stream_error() {
        let chunks = stream::iter(vec![
            Ok(b"data: a\n".to_vec()),
            Err("connection reset".to_string()),
        ]);

        let fragments = fragments_from_bytes(chunks, |payload| {
            Ok(SseStep::Fragment(payload.to_string()))
        })
        .collect::<Vec<_>>()
        .await;

        assert_eq!(fragments.len(), 2);
        let error = fragments[1].clone().expect_err("second item is an error");
        assert_eq!(error.kind, crate::ProviderErrorKind::Stream);
    }
}
