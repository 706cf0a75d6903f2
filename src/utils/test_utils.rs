use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt;

use crate::api::ChatRequest;
use crate::core::chat_stream::{CompletionTransport, DeltaStream, StreamDelta};
use crate::core::config::Profile;
use crate::core::error::TransportError;

type Script =
    dyn Fn(&ChatRequest) -> Result<Vec<Result<StreamDelta, TransportError>>, TransportError>
        + Send
        + Sync;

/// In-memory transport that replays a script per request and records how
/// many requests were open at once.
pub struct ScriptedTransport {
    script: Box<Script>,
    open_delay: Duration,
    hang: bool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&ChatRequest) -> Result<Vec<Result<StreamDelta, TransportError>>, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            script: Box::new(script),
            open_delay: Duration::ZERO,
            hang: false,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request streams the same content fragments.
    pub fn fragments(fragments: &[&str]) -> Self {
        let fragments: Vec<String> = fragments.iter().map(|f| f.to_string()).collect();
        Self::new(move |_| {
            Ok(fragments
                .iter()
                .cloned()
                .map(|f| Ok(StreamDelta::Content(f)))
                .collect())
        })
    }

    /// Holds each request open for `delay` before the stream starts.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// The stream never ends after the scripted items.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

/// Content of the last user message, which scripts key their replies on.
pub fn last_user_text(request: &ChatRequest) -> &str {
    request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn open(&self, request: &ChatRequest) -> Result<DeltaStream, TransportError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let items = (self.script)(request)?;
        if self.hang {
            Ok(stream::iter(items).chain(stream::pending()).boxed())
        } else {
            Ok(stream::iter(items).boxed())
        }
    }
}

pub fn test_profile() -> Profile {
    Profile {
        name: "test".to_string(),
        model: Some("test-model".to_string()),
        host: "http://localhost:8080/v1".to_string(),
        api_key: None,
        prompt_name: None,
        tool_files: Vec::new(),
        structured_streaming: true,
        cot_tag: Some("think".to_string()),
        min_chunk_size: 1,
        rethink: false,
        parameters: serde_json::Map::new(),
        extra: std::collections::BTreeMap::new(),
    }
}
