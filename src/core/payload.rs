use serde_json::{Map, Value};

use crate::api::{ChatRequest, ChatToolDefinition};
use crate::core::config::Profile;
use crate::core::conversation::ConversationState;

/// Turns a conversation into a request body for one profile.
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    model: String,
    parameters: Map<String, Value>,
}

impl PayloadBuilder {
    pub fn new(profile: &Profile, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            parameters: profile.parameters.clone(),
        }
    }

    /// Adds per-request body fields; these win over the profile's.
    pub fn with_parameters(mut self, extra: Map<String, Value>) -> Self {
        self.parameters.extend(extra);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn build(&self, conversation: &ConversationState) -> ChatRequest {
        self.build_with_tools(conversation, None)
    }

    pub fn build_with_tools(
        &self,
        conversation: &ConversationState,
        tools: Option<Vec<ChatToolDefinition>>,
    ) -> ChatRequest {
        let mut parameters = self.parameters.clone();
        // Reserved body fields are owned by the builder.
        for reserved in ["model", "messages", "stream", "tools"] {
            parameters.remove(reserved);
        }

        ChatRequest {
            model: self.model.clone(),
            messages: conversation.api_messages(),
            stream: true,
            tools: tools.filter(|tools| !tools.is_empty()),
            parameters,
        }
    }
}
