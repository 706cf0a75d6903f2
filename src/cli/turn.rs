use std::collections::BTreeSet;

use tracing::warn;

use crate::core::conversation::ConversationState;
use crate::core::error::SessionError;
use crate::core::payload::PayloadBuilder;
use crate::core::session::StreamingSession;
use crate::core::tools::ToolRegistry;
use crate::ui::renderer::Renderer;

/// Tools offered to the model for one exchange.
#[derive(Clone, Copy)]
pub struct ToolScope<'a> {
    pub registry: &'a ToolRegistry,
    pub enabled: &'a BTreeSet<String>,
}

/// Sends the conversation and keeps answering tool calls until the model
/// replies with text alone. Partial text from a failed or cancelled stream
/// is committed before the error is returned.
pub async fn run_exchange(
    session: &StreamingSession,
    builder: &PayloadBuilder,
    conversation: &mut ConversationState,
    tools: Option<ToolScope<'_>>,
    renderer: &mut dyn Renderer,
) -> Result<(), SessionError> {
    loop {
        let definitions = tools.map(|scope| scope.registry.definitions(scope.enabled));
        let request = builder.build_with_tools(conversation, definitions);

        let output = match session.run(&request, renderer.as_sink()).await {
            Ok(output) => output,
            Err(e) => {
                if !e.partial().is_empty() {
                    conversation.append_assistant(e.partial());
                }
                return Err(e);
            }
        };

        if output.tool_calls.is_empty() {
            conversation.append_assistant(&output.text);
            return Ok(());
        }

        let Some(scope) = tools else {
            warn!(calls = output.tool_calls.len(), "model requested tools but none are configured");
            conversation.append_assistant(&output.text);
            return Ok(());
        };

        conversation.append_tool_request(&output.text, output.tool_calls.clone());
        for call in &output.tool_calls {
            let result = match scope.registry.invoke(call, scope.enabled).await {
                Ok(stdout) => stdout,
                Err(e) => {
                    warn!(tool = %call.function.name, error = %e, "tool call failed");
                    renderer.notice(&format!("⚠️  {e}"))?;
                    format!("Error: {e}")
                }
            };
            conversation.append_tool_result(&call.id, result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ChatToolCallDelta, ChatToolCallFunctionDelta};
    use crate::core::assembler::ClassifiedEvent;
    use crate::core::chat_stream::StreamDelta;
    use crate::core::message::Role;
    use crate::core::session::EventSink;
    use crate::core::tools::ToolSpec;
    use crate::utils::test_utils::{test_profile, ScriptedTransport};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::io;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        events: Vec<ClassifiedEvent>,
        notices: Vec<String>,
    }

    impl EventSink for Recorder {
        fn handle(&mut self, event: &ClassifiedEvent) -> io::Result<()> {
            self.events.push(event.clone());
            Ok(())
        }
    }

    impl Renderer for Recorder {
        fn notice(&mut self, text: &str) -> io::Result<()> {
            self.notices.push(text.to_string());
            Ok(())
        }

        fn as_sink(&mut self) -> &mut dyn EventSink {
            self
        }
    }

    fn echo_registry() -> ToolRegistry {
        let mut tools = BTreeMap::new();
        tools.insert(
            "echo".to_string(),
            ToolSpec {
                description: None,
                parameters: json!({"type": "object"}),
                command: vec!["cat".to_string()],
                enabled: true,
            },
        );
        ToolRegistry::new(tools).expect("registry")
    }

    fn tool_call_delta() -> StreamDelta {
        StreamDelta::ToolCall(ChatToolCallDelta {
            index: Some(0),
            id: Some("call_1".to_string()),
            kind: Some("function".to_string()),
            function: Some(ChatToolCallFunctionDelta {
                name: Some("echo".to_string()),
                arguments: Some(r#"{"x":1}"#.to_string()),
            }),
        })
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_until_text_arrives() {
        let transport = ScriptedTransport::new(|request| {
            let answered = request.messages.iter().any(|m| m.role == "tool");
            Ok(if answered {
                vec![Ok(StreamDelta::Content("done".to_string()))]
            } else {
                vec![Ok(tool_call_delta())]
            })
        });
        let transport = Arc::new(transport);
        let profile = test_profile();
        let session = StreamingSession::new(transport.clone(), profile.delimiter(), 1);
        let builder = PayloadBuilder::new(&profile, "m");
        let registry = echo_registry();
        let enabled: BTreeSet<String> = ["echo".to_string()].into();
        let mut conversation = ConversationState::new(None);
        conversation.append_user("use the tool");
        let mut recorder = Recorder::default();

        run_exchange(
            &session,
            &builder,
            &mut conversation,
            Some(ToolScope {
                registry: &registry,
                enabled: &enabled,
            }),
            &mut recorder,
        )
        .await
        .expect("exchange");

        let roles: Vec<_> = conversation.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(conversation.turns()[2].content, r#"{"x":1}"#);
        assert_eq!(conversation.turns()[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(conversation.turns()[3].content, "done");

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].tools.is_some());
    }

    #[tokio::test]
    async fn failed_tools_are_reported_to_the_model() {
        let transport = ScriptedTransport::new(|request| {
            let answered = request.messages.iter().any(|m| m.role == "tool");
            Ok(if answered {
                vec![Ok(StreamDelta::Content("sorry".to_string()))]
            } else {
                vec![Ok(tool_call_delta())]
            })
        });
        let profile = test_profile();
        let session = StreamingSession::new(Arc::new(transport), profile.delimiter(), 1);
        let builder = PayloadBuilder::new(&profile, "m");
        let registry = echo_registry();
        let enabled = BTreeSet::new();
        let mut conversation = ConversationState::new(None);
        conversation.append_user("use the tool");
        let mut recorder = Recorder::default();

        run_exchange(
            &session,
            &builder,
            &mut conversation,
            Some(ToolScope {
                registry: &registry,
                enabled: &enabled,
            }),
            &mut recorder,
        )
        .await
        .expect("exchange");

        assert!(conversation.turns()[2].content.starts_with("Error:"));
        assert_eq!(recorder.notices.len(), 1);
    }

    #[tokio::test]
    async fn partial_text_is_kept_on_failure() {
        let transport = ScriptedTransport::new(|_| {
            Ok(vec![
                Ok(StreamDelta::Content("half an ans".to_string())),
                Err(crate::core::error::TransportError::Interrupted("reset".to_string())),
            ])
        });
        let profile = test_profile();
        let session = StreamingSession::new(Arc::new(transport), profile.delimiter(), 1);
        let builder = PayloadBuilder::new(&profile, "m");
        let mut conversation = ConversationState::new(None);
        conversation.append_user("q");
        let mut recorder = Recorder::default();

        let err = run_exchange(&session, &builder, &mut conversation, None, &mut recorder)
            .await
            .expect_err("stream fails");

        assert!(matches!(err, SessionError::Transport { .. }));
        assert_eq!(conversation.turns().len(), 2);
        assert_eq!(conversation.turns()[1].content, "half an ans");
    }
}
