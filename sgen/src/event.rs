//! Ordered stream events and their wire representation.
//!
//! ```rust
//! use scommon::{ConversationId, MessageId};
//! use sgen::StreamEvent;
//!
//! let event = StreamEvent::chunk(MessageId::new("m-1"), ConversationId::new("c-1"), 4, 0, "Hel");
//! let json = serde_json::to_value(event.to_wire()).expect("wire message serializes");
//!
//! assert_eq!(json["messageType"], "chunk");
//! assert_eq!(json["chunkIndex"], 0);
//! assert_eq!(json["correlationId"], "c-1");
//! assert_eq!(json["payload"]["text"], "Hel");
//! ```

use scommon::{ConversationId, MessageId, Role, TokenUsage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEventKind {
    Chunk,
    Final,
    System,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub kind: StreamEventKind,
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub sequence: u64,
    pub chunk_index: u64,
    pub is_final: bool,
    pub role: Role,
    pub text: String,
    /// Terminal `Final` events only.
    pub usage: Option<TokenUsage>,
    pub cost_usd: Option<f64>,
}

impl StreamEvent {
    pub fn chunk(
        message_id: MessageId,
        conversation_id: ConversationId,
        sequence: u64,
        chunk_index: u64,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind: StreamEventKind::Chunk,
            message_id,
            conversation_id,
            sequence,
            chunk_index,
            is_final: false,
            role: Role::Assistant,
            text: text.into(),
            usage: None,
            cost_usd: None,
        }
    }

    pub fn terminal(
        message_id: MessageId,
        conversation_id: ConversationId,
        sequence: u64,
        chunk_index: u64,
        text: impl Into<String>,
        usage: TokenUsage,
        cost_usd: f64,
    ) -> Self {
        Self {
            kind: StreamEventKind::Final,
            is_final: true,
            usage: Some(usage),
            cost_usd: Some(cost_usd),
            ..Self::chunk(message_id, conversation_id, sequence, chunk_index, text)
        }
    }

    pub fn error(
        message_id: MessageId,
        conversation_id: ConversationId,
        sequence: u64,
        chunk_index: u64,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind: StreamEventKind::Error,
            is_final: true,
            role: Role::System,
            ..Self::chunk(message_id, conversation_id, sequence, chunk_index, text)
        }
    }

    pub fn to_wire(&self) -> WireMessage {
        WireMessage {
            message_type: self.kind,
            message_id: self.message_id.as_str().to_string(),
            sequence: self.sequence,
            chunk_index: self.chunk_index,
            is_final: self.is_final,
            correlation_id: self.conversation_id.as_str().to_string(),
            role: self.role,
            payload: WirePayload {
                text: self.text.clone(),
                usage: self.usage.map(|usage| WireUsage {
                    input: usage.input_tokens,
                    output: usage.output_tokens,
                }),
                cost_estimate_usd: self.cost_usd,
            },
        }
    }
}

/// JSON shape pushed to recipients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub message_type: StreamEventKind,
    pub message_id: String,
    pub sequence: u64,
    pub chunk_index: u64,
    pub is_final: bool,
    pub correlation_id: String,
    pub role: Role,
    pub payload: WirePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<WireUsage>,
    #[serde(
        rename = "costEstimateUSD",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cost_estimate_usd: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireUsage {
    pub input: u32,
    pub output: u32,
}
