//! Wire types for the legal Q&A backend. Client ↔ server JSON.
//! One contract: `model` in the request, `response` in the reply.

use serde::{Deserialize, Serialize};

/// Client → server: query request. Immutable once issued; the transport
/// forces the `stream` flag for the path it uses.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub stream: bool,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            model: model.into(),
            conversation_id: None,
            strategy: None,
            max_tokens: None,
            temperature: None,
            stream: false,
        }
    }
}

/// A cited source. Order is citation order and is preserved as returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// Server → client: metadata produced once, at completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseMetadata {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub num_chunks: u32,
    #[serde(default)]
    pub tokens_used: u32,
    #[serde(default)]
    pub processing_time: f64,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Server → client: non-streaming reply body.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub response: String,
    #[serde(default)]
    pub metadata: Option<ResponseMetadata>,
    #[serde(default)]
    pub context_sources: Vec<Source>,
}

/// Server → client: error body on a non-2xx status.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// One message of a stored conversation.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ConversationMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// `GET /conversation/{id}` reply.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ConversationHistory {
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
}

/// One decoded unit from the event stream. Exactly one `Done` or `Error`
/// ends a stream; discrimination is by field presence, error first.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Partial text: incremental piece plus the cumulative text so far.
    Text { chunk: String, full: String },
    /// Terminal event: final sources and metadata, no further events follow.
    Done {
        sources: Vec<Source>,
        metadata: Option<ResponseMetadata>,
    },
    /// Backend-signaled error; terminates the stream.
    Error { message: String },
}

impl StreamChunk {
    /// Decode one SSE data payload. `Err` means the payload is not valid
    /// JSON or matches none of the three shapes; the caller decides whether
    /// that is fatal (for stream events it is not).
    pub fn decode(payload: &str) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_str(payload).map_err(|e| e.to_string())?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, String> {
        if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
            return Ok(StreamChunk::Error {
                message: message.to_string(),
            });
        }
        if value.get("done").and_then(|d| d.as_bool()).unwrap_or(false) {
            let sources = match value.get("context_sources") {
                Some(v) if !v.is_null() => {
                    serde_json::from_value(v.clone()).map_err(|e| e.to_string())?
                }
                _ => Vec::new(),
            };
            let metadata = match value.get("metadata") {
                Some(v) if !v.is_null() => {
                    Some(serde_json::from_value(v.clone()).map_err(|e| e.to_string())?)
                }
                _ => None,
            };
            return Ok(StreamChunk::Done { sources, metadata });
        }
        if let Some(full) = value.get("full").and_then(|f| f.as_str()) {
            let chunk = value
                .get("chunk")
                .and_then(|c| c.as_str())
                .unwrap_or_default();
            return Ok(StreamChunk::Text {
                chunk: chunk.to_string(),
                full: full.to_string(),
            });
        }
        Err(format!("event is none of error/done/chunk: {}", value))
    }
}
