//! One request/response cycle: transport deltas in, classified events out.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ChatRequest, ChatToolCall, ChatToolCallDelta, ChatToolCallFunction};
use crate::core::assembler::{ChunkAssembler, ClassifiedEvent, DelimiterTag};
use crate::core::chat_stream::{CompletionTransport, StreamDelta};
use crate::core::error::SessionError;

/// Receives classified events as soon as the assembler releases them.
pub trait EventSink: Send {
    fn handle(&mut self, event: &ClassifiedEvent) -> io::Result<()>;

    /// Called once per completed tool call, after the response text.
    fn tool_call(&mut self, _name: &str) -> io::Result<()> {
        Ok(())
    }

    /// End of the response, including cancelled and failed ones.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl EventSink for Vec<ClassifiedEvent> {
    fn handle(&mut self, event: &ClassifiedEvent) -> io::Result<()> {
        self.push(event.clone());
        Ok(())
    }
}

/// Discards everything; batch jobs only need the final text.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn handle(&mut self, _event: &ClassifiedEvent) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionOutput {
    /// Concatenated visible text; thought text is never included.
    pub text: String,
    pub tool_calls: Vec<ChatToolCall>,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

fn append_tool_call_delta(pending: &mut BTreeMap<u32, PendingToolCall>, delta: ChatToolCallDelta) {
    let index = delta.index.unwrap_or(0);
    let entry = pending.entry(index).or_default();

    if delta.id.is_some() {
        entry.id = delta.id;
    }
    if let Some(function) = delta.function {
        if function.name.is_some() {
            entry.name = function.name;
        }
        if let Some(arguments) = function.arguments {
            entry.arguments.push_str(&arguments);
        }
    }
}

fn finalize_tool_calls(pending: BTreeMap<u32, PendingToolCall>) -> Vec<ChatToolCall> {
    pending
        .into_iter()
        .filter_map(|(index, call)| {
            let Some(name) = call.name else {
                warn!(index, "dropping tool call without a function name");
                return None;
            };
            let arguments = if call.arguments.trim().is_empty() {
                "{}".to_string()
            } else {
                call.arguments
            };
            Some(ChatToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{index}")),
                kind: "function".to_string(),
                function: ChatToolCallFunction { name, arguments },
            })
        })
        .collect()
}

fn forward(
    sink: &mut dyn EventSink,
    visible: &mut String,
    event: &ClassifiedEvent,
) -> io::Result<()> {
    if let ClassifiedEvent::Visible(text) = event {
        visible.push_str(text);
    }
    sink.handle(event)
}

fn close_out(
    assembler: ChunkAssembler,
    sink: &mut dyn EventSink,
    visible: &mut String,
) -> io::Result<()> {
    for event in assembler.finish() {
        forward(sink, visible, &event)?;
    }
    sink.finish()
}

/// Closes out a stream that already failed. A sink error here is only
/// logged so the caller still sees the failure that ended the stream.
fn close_out_after_failure(
    assembler: ChunkAssembler,
    sink: &mut dyn EventSink,
    visible: &mut String,
) {
    if let Err(e) = close_out(assembler, sink, visible) {
        warn!(error = %e, "could not finish output after the stream ended");
    }
}

/// Drives one streaming request with a fresh [`ChunkAssembler`].
#[derive(Clone)]
pub struct StreamingSession {
    transport: Arc<dyn CompletionTransport>,
    tag: Option<DelimiterTag>,
    min_chunk_size: usize,
    cancel: CancellationToken,
}

impl StreamingSession {
    pub fn new(
        transport: Arc<dyn CompletionTransport>,
        tag: Option<DelimiterTag>,
        min_chunk_size: usize,
    ) -> Self {
        Self {
            transport,
            tag,
            min_chunk_size,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs the request to completion. On failure or cancellation the error
    /// carries the visible text already handed to `sink`; nothing shown is
    /// taken back.
    pub async fn run(
        &self,
        request: &ChatRequest,
        sink: &mut dyn EventSink,
    ) -> Result<SessionOutput, SessionError> {
        let mut stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(SessionError::Cancelled { partial: String::new() });
            }
            opened = self.transport.open(request) => opened.map_err(|source| {
                SessionError::Transport { source, partial: String::new() }
            })?,
        };

        let mut assembler = ChunkAssembler::new(self.tag.clone(), self.min_chunk_size);
        let mut visible = String::new();
        let mut pending_calls = BTreeMap::new();
        let mut fragments = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(fragments, "stream cancelled");
                    close_out_after_failure(assembler, sink, &mut visible);
                    return Err(SessionError::Cancelled { partial: visible });
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(StreamDelta::Content(text))) => {
                    fragments += 1;
                    for event in assembler.push(&text) {
                        forward(sink, &mut visible, &event)?;
                    }
                }
                Some(Ok(StreamDelta::Reasoning(text))) => {
                    fragments += 1;
                    for event in assembler.flush_ready() {
                        forward(sink, &mut visible, &event)?;
                    }
                    forward(sink, &mut visible, &ClassifiedEvent::Thought(text))?;
                }
                Some(Ok(StreamDelta::ToolCall(delta))) => {
                    append_tool_call_delta(&mut pending_calls, delta);
                }
                Some(Err(source)) => {
                    debug!(fragments, error = %source, "stream failed");
                    close_out_after_failure(assembler, sink, &mut visible);
                    return Err(SessionError::Transport {
                        source,
                        partial: visible,
                    });
                }
                None => break,
            }
        }

        close_out(assembler, sink, &mut visible)?;
        let tool_calls = finalize_tool_calls(pending_calls);
        for call in &tool_calls {
            sink.tool_call(&call.function.name)?;
        }
        debug!(fragments, chars = visible.len(), tool_calls = tool_calls.len(), "stream complete");

        Ok(SessionOutput {
            text: visible,
            tool_calls,
        })
    }
}
