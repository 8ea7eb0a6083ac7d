//! HTTP client for the legal Q&A backend: single request/response exchange
//! (`POST /query`), SSE streaming (`GET /query?...&stream=true`), and the
//! conversation-management endpoints.

use std::time::Duration;

use futures_util::StreamExt;

use crate::messages::{
    ConversationHistory, ErrorBody, QueryRequest, QueryResponse, ResponseMetadata, Source,
    StreamChunk,
};

/// Transport/session error taxonomy. None of these are retried
/// automatically; retry is a user-initiated re-submission.
#[derive(Debug)]
pub enum QueryError {
    /// Connection could not be established or was dropped.
    Network(String),
    /// Non-2xx status with the backend's message/code when present.
    Api {
        message: String,
        code: Option<String>,
        status: u16,
    },
    /// Response body cannot be parsed as the expected shape.
    MalformedResponse(String),
    /// Backend-signaled error mid-stream.
    Stream(String),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::Network(msg) => write!(f, "network error: {}", msg),
            QueryError::Api {
                message,
                code,
                status,
            } => {
                write!(f, "API error (status {}): {}", status, message)?;
                if let Some(code) = code {
                    write!(f, " [{}]", code)?;
                }
                Ok(())
            }
            QueryError::MalformedResponse(msg) => write!(f, "malformed response: {}", msg),
            QueryError::Stream(msg) => write!(f, "stream error: {}", msg),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<reqwest::Error> for QueryError {
    fn from(e: reqwest::Error) -> Self {
        QueryError::Network(e.to_string())
    }
}

/// One dispatched unit of an open stream. Exactly one `Done` or `Failed`
/// ends the dispatch sequence for a given stream.
#[derive(Debug)]
pub enum StreamEvent {
    /// Partial text; `full` is the backend's cumulative text verbatim.
    Chunk { delta: String, full: String },
    /// Terminal event; the transport has already closed the connection.
    Done {
        sources: Vec<Source>,
        metadata: Option<ResponseMetadata>,
    },
    /// Backend error event, transport failure mid-stream, or stream end
    /// without a terminal event.
    Failed(QueryError),
}

/// Client for the legal Q&A backend. Base URL and timeout come from config.
/// The timeout applies to single exchanges only; an open stream has no
/// independent timeout and ends only on cancellation or backend close.
pub struct QueryClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl QueryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, QueryError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| QueryError::Network(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Single blocking exchange: `POST /query` with the JSON body, stream
    /// flag forced off.
    pub async fn send_once(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        let mut request = request.clone();
        request.stream = false;
        let response = self
            .http
            .post(format!("{}/query", self.base_url))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;
        response
            .json::<QueryResponse>()
            .await
            .map_err(|e| QueryError::MalformedResponse(e.to_string()))
    }

    /// Open the event stream: `GET /query` with the request fields as query
    /// parameters and `stream=true`. The connection is established (status
    /// checked) before this returns; reading starts with [`StreamConnection::dispatch`].
    pub async fn open_stream(
        &self,
        request: &QueryRequest,
    ) -> Result<StreamConnection, QueryError> {
        let mut request = request.clone();
        request.stream = true;
        let response = self
            .http
            .get(format!("{}/query", self.base_url))
            .query(&request)
            .send()
            .await?;
        let response = check_status(response).await?;
        tracing::debug!(url = %response.url(), "query stream opened");
        Ok(StreamConnection { response })
    }

    /// `GET /conversation/{id}`.
    pub async fn get_conversation(&self, id: &str) -> Result<ConversationHistory, QueryError> {
        let response = self
            .http
            .get(format!("{}/conversation/{}", self.base_url, id))
            .timeout(self.timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        response
            .json::<ConversationHistory>()
            .await
            .map_err(|e| QueryError::MalformedResponse(e.to_string()))
    }

    /// `DELETE /conversation/{id}`.
    pub async fn delete_conversation(&self, id: &str) -> Result<(), QueryError> {
        let response = self
            .http
            .delete(format!("{}/conversation/{}", self.base_url, id))
            .timeout(self.timeout)
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    /// `DELETE /conversation/{id}/message/{index}`.
    pub async fn delete_message(&self, id: &str, index: usize) -> Result<(), QueryError> {
        let response = self
            .http
            .delete(format!(
                "{}/conversation/{}/message/{}",
                self.base_url, id, index
            ))
            .timeout(self.timeout)
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    /// `DELETE /conversation/{id}/messages` with a JSON array of indices.
    pub async fn delete_messages(&self, id: &str, indices: &[usize]) -> Result<(), QueryError> {
        let response = self
            .http
            .delete(format!("{}/conversation/{}/messages", self.base_url, id))
            .timeout(self.timeout)
            .json(&indices)
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }
}

/// Map a non-success response to `Api`, reading `{message, code}` from the
/// body when it parses.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, QueryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let (message, code) = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) if !err.message.is_empty() => (err.message, err.code),
        _ => ("An error occurred".to_string(), None),
    };
    Err(QueryError::Api {
        message,
        code,
        status: status.as_u16(),
    })
}

/// An established stream connection, not yet being read.
pub struct StreamConnection {
    response: reqwest::Response,
}

impl StreamConnection {
    /// Spawn the reader task. Each decoded event is dispatched through
    /// `on_event`; undecodable payloads are logged and dropped without
    /// closing the stream. On the terminal event the reader closes the
    /// connection and exits.
    pub fn dispatch<F>(self, mut on_event: F) -> StreamHandle
    where
        F: FnMut(StreamEvent) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            read_events(self.response, &mut on_event).await;
        });
        StreamHandle { task }
    }
}

/// Handle to an open stream. `close` is idempotent and safe after natural
/// completion.
pub struct StreamHandle {
    task: tokio::task::JoinHandle<()>,
}

impl StreamHandle {
    pub fn close(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn read_events<F: FnMut(StreamEvent)>(response: reqwest::Response, on_event: &mut F) {
    let mut body = response.bytes_stream();
    // Raw byte buffer: a multi-byte UTF-8 character can arrive split across
    // two body chunks, so text conversion happens only on complete frames.
    let mut buf: Vec<u8> = Vec::new();
    while let Some(item) = body.next().await {
        let bytes = match item {
            Ok(b) => b,
            Err(e) => {
                on_event(StreamEvent::Failed(QueryError::Network(e.to_string())));
                return;
            }
        };
        buf.extend_from_slice(&bytes);
        // SSE frames are separated by a blank line (LF or CRLF endings);
        // each "data:" line is one JSON payload.
        while let Some((end, delim_len)) = find_frame_end(&buf) {
            let frame_bytes: Vec<u8> = buf.drain(..end + delim_len).collect();
            let frame = match std::str::from_utf8(&frame_bytes[..end]) {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping non-UTF-8 stream frame");
                    continue;
                }
            };
            for payload in data_payloads(frame) {
                match StreamChunk::decode(payload) {
                    Ok(StreamChunk::Text { chunk, full }) => {
                        on_event(StreamEvent::Chunk { delta: chunk, full });
                    }
                    Ok(StreamChunk::Done { sources, metadata }) => {
                        tracing::debug!(sources = sources.len(), "stream completed");
                        on_event(StreamEvent::Done { sources, metadata });
                        // Drops the response body, closing the connection.
                        return;
                    }
                    Ok(StreamChunk::Error { message }) => {
                        on_event(StreamEvent::Failed(QueryError::Stream(message)));
                        return;
                    }
                    Err(e) => {
                        // A malformed single chunk must not abort the answer.
                        tracing::warn!(error = %e, "dropping malformed stream event");
                    }
                }
            }
        }
    }
    on_event(StreamEvent::Failed(QueryError::Network(
        "stream closed before completion".to_string(),
    )));
}

/// Locate the blank line ending the first complete SSE frame in `buf`.
/// Returns (frame length, delimiter length) for whichever of `\n\n` and
/// `\r\n\r\n` comes first.
fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n");
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(l), Some(c)) if c < l => Some((c, 4)),
        (Some(l), _) => Some((l, 2)),
        (None, Some(c)) => Some((c, 4)),
        (None, None) => None,
    }
}

/// Extract the `data:` payloads of one SSE frame.
fn data_payloads(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|payload| payload.strip_prefix(' ').unwrap_or(payload))
}
