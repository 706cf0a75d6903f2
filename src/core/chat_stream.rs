//! Streaming transport for OpenAI-compatible `chat/completions`.
//!
//! The transport owns the wire envelope: it splits the SSE body into lines,
//! decodes each `data:` payload and hands the pipeline nothing but decoded
//! deltas in arrival order. A failure is a distinct `Err` item; end of stream
//! is the end of the stream.

use std::collections::VecDeque;
use std::fmt::Display;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream};
use futures_util::StreamExt;
use memchr::memchr;
use tracing::{debug, warn};

use crate::api::{ChatRequest, ChatResponse, ChatToolCallDelta};
use crate::core::endpoint::{endpoint_url, CHAT_COMPLETIONS};
use crate::core::error::TransportError;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    /// Answer text, possibly containing inline thought markers.
    Content(String),
    /// Reasoning delivered on a dedicated field by the server.
    Reasoning(String),
    ToolCall(ChatToolCallDelta),
}

pub type DeltaStream = BoxStream<'static, Result<StreamDelta, TransportError>>;

/// Opens one streaming request. Implementations must be shareable across
/// concurrently running sessions.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn open(&self, request: &ChatRequest) -> Result<DeltaStream, TransportError>;
}

#[derive(Debug, PartialEq)]
enum LineOutcome {
    Deltas(Vec<StreamDelta>),
    Done,
    Error(String),
    Skip,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn handle_data_payload(payload: &str, structured: bool) -> LineOutcome {
    if payload == "[DONE]" {
        return LineOutcome::Done;
    }

    let value = match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) => value,
        Err(_) => {
            if payload.trim().is_empty() {
                return LineOutcome::Skip;
            }
            return LineOutcome::Error(format_api_error(payload));
        }
    };
    if value.get("error").is_some() {
        return LineOutcome::Error(format_api_error(payload));
    }

    match serde_json::from_value::<ChatResponse>(value) {
        Ok(response) => {
            let mut deltas = Vec::new();
            if let Some(choice) = response.choices.into_iter().next() {
                let delta = choice.delta;
                if structured {
                    if let Some(reasoning) = delta.reasoning_content.or(delta.reasoning) {
                        if !reasoning.is_empty() {
                            deltas.push(StreamDelta::Reasoning(reasoning));
                        }
                    }
                }
                if let Some(content) = delta.content {
                    if !content.is_empty() {
                        deltas.push(StreamDelta::Content(content));
                    }
                }
                for call in delta.tool_calls.unwrap_or_default() {
                    deltas.push(StreamDelta::ToolCall(call));
                }
            }
            LineOutcome::Deltas(deltas)
        }
        Err(_) => LineOutcome::Error(format_api_error(payload)),
    }
}

fn process_sse_line(line: &str, structured: bool) -> LineOutcome {
    extract_data_payload(line)
        .map(|payload| handle_data_payload(payload, structured))
        .unwrap_or(LineOutcome::Skip)
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Renders an error body for the terminal: JSON is pretty-printed under its
/// summary line, XML and plain text are fenced as-is.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(&json_value) {
                if !summary.is_empty() {
                    return format!("API Error: {summary}\n```json\n{pretty_json}\n```");
                }
            }
            return format!("API Error:\n```json\n{pretty_json}\n```");
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{trimmed}\n```")
    } else {
        format!("API Error:\n```\n{trimmed}\n```")
    }
}

struct SseState {
    body: BoxStream<'static, Result<Vec<u8>, String>>,
    buffer: Vec<u8>,
    queue: VecDeque<Result<StreamDelta, TransportError>>,
    structured: bool,
    finished: bool,
}

impl SseState {
    fn ingest(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            self.process_line(&line[..newline_pos]);
            if self.finished {
                return;
            }
        }
    }

    fn flush_tail(&mut self) {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(&line);
        }
        self.finished = true;
    }

    fn process_line(&mut self, raw: &[u8]) {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!(error = %e, "skipping invalid UTF-8 in stream");
                return;
            }
        };

        match process_sse_line(line, self.structured) {
            LineOutcome::Deltas(deltas) => self.queue.extend(deltas.into_iter().map(Ok)),
            LineOutcome::Done => {
                debug!("stream reported [DONE]");
                self.finished = true;
            }
            LineOutcome::Error(message) => {
                self.queue.push_back(Err(TransportError::Api(message)));
                self.finished = true;
            }
            LineOutcome::Skip => {}
        }
    }
}

/// Decodes an SSE byte stream into deltas. Chunk boundaries may fall
/// anywhere, including inside a line or a UTF-8 sequence.
pub fn sse_deltas<S, B, E>(body: S, structured: bool) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + 'static,
    E: Display + 'static,
{
    let body = body
        .map(|chunk| {
            chunk
                .map(|bytes| bytes.as_ref().to_vec())
                .map_err(|e| e.to_string())
        })
        .boxed();

    let state = SseState {
        body,
        buffer: Vec::new(),
        queue: VecDeque::new(),
        structured,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => state.ingest(&bytes),
                Some(Err(e)) => {
                    state.queue.push_back(Err(TransportError::Interrupted(e)));
                    state.finished = true;
                }
                None => state.flush_tail(),
            }
        }
    })
    .boxed()
}

/// HTTP transport bound to one endpoint and credential.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    structured_streaming: bool,
}

impl HttpTransport {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        structured_streaming: bool,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            structured_streaming,
        }
    }
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<DeltaStream, TransportError> {
        let chat_url = endpoint_url(&self.base_url, CHAT_COMPLETIONS);
        debug!(url = %chat_url, model = %request.model, turns = request.messages.len(), "opening stream");

        let mut http_request = self
            .client
            .post(chat_url)
            .header("Content-Type", "application/json");
        if let Some(api_key) = &self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = http_request.json(request).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(TransportError::Status {
                status,
                message: format_api_error(&error_text),
            });
        }

        Ok(sse_deltas(response.bytes_stream(), self.structured_streaming))
    }
}
