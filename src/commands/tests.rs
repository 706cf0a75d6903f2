use super::*;
use crate::core::message::Role;
use crate::core::tools::ToolSpec;
use serde_json::json;
use std::collections::BTreeMap;
use tempfile::tempdir;

fn chat_state() -> ChatState {
    let mut conversation = ConversationState::new(Some("sys".to_string()));
    conversation.append_user("seed");
    conversation.mark_baseline();
    ChatState::new(conversation, None)
}

fn printed(result: CommandResult) -> String {
    match result {
        CommandResult::Print(text) => text,
        _ => panic!("expected printed output"),
    }
}

fn offered(state: &ChatState) -> Option<Vec<crate::api::ChatToolDefinition>> {
    state
        .tools
        .as_deref()
        .map(|registry| registry.definitions(&state.enabled_tools))
}

fn tool_registry() -> Arc<ToolRegistry> {
    let mut tools = BTreeMap::new();
    for name in ["clock", "weather"] {
        tools.insert(
            name.to_string(),
            ToolSpec {
                description: Some(format!("{name} tool")),
                parameters: json!({"type": "object"}),
                command: vec!["true".to_string()],
                enabled: true,
            },
        );
    }
    Arc::new(ToolRegistry::new(tools).expect("registry"))
}

#[test]
fn registry_lists_commands() {
    let names: Vec<_> = all_commands().iter().map(|cmd| cmd.name).collect();
    for expected in ["help", "reset", "save", "pretty", "undo", "redo", "multiline", "tools", "quit"] {
        assert!(names.contains(&expected), "missing /{expected}");
    }
}

#[test]
fn plain_text_and_unknown_commands_are_messages() {
    let mut state = chat_state();
    assert!(matches!(
        process_input(&mut state, "hello"),
        CommandResult::ProcessAsMessage(text) if text == "hello"
    ));
    assert!(matches!(
        process_input(&mut state, "/usr/bin is a path"),
        CommandResult::ProcessAsMessage(_)
    ));
    assert!(matches!(process_input(&mut state, "/QUIT"), CommandResult::Quit));
}

#[test]
fn help_mentions_every_command() {
    let mut state = chat_state();
    let help = printed(process_input(&mut state, "/help"));
    for command in all_commands() {
        assert!(help.contains(command.usage));
    }
}

#[test]
fn reset_returns_to_baseline() {
    let mut state = chat_state();
    state.conversation.append_user("q");
    state.conversation.append_assistant("a");

    process_input(&mut state, "/reset");
    assert_eq!(state.conversation.turns().len(), 1);
    assert_eq!(state.conversation.turns()[0].content, "seed");
}

#[test]
fn undo_and_redo_drop_the_last_exchange() {
    let mut state = chat_state();
    state.conversation.append_user("first");
    state.conversation.append_assistant("one");
    state.conversation.append_user("second");
    state.conversation.append_assistant("two");

    match process_input(&mut state, "/redo") {
        CommandResult::ProcessAsMessage(text) => assert_eq!(text, "second"),
        _ => panic!("redo should resend the prompt"),
    }
    assert_eq!(state.conversation.turns().len(), 3);

    assert_eq!(printed(process_input(&mut state, "/undo")), "Removed the last exchange.");
    assert_eq!(state.conversation.turns().len(), 1);
    assert_eq!(printed(process_input(&mut state, "/undo")), "Nothing to undo.");
}

#[test]
fn save_writes_jsonl_and_refuses_to_overwrite() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("chat.jsonl");
    let mut state = chat_state();
    state.conversation.append_assistant("hi there");

    let message = printed(process_input(&mut state, &format!("/save {}", path.display())));
    assert!(message.starts_with("Saved 3 turns"));

    let contents = std::fs::read_to_string(&path).expect("read");
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).expect("json"))
        .collect();
    assert_eq!(lines[0], json!({"role": "system", "content": "sys"}));
    assert_eq!(lines[2], json!({"role": "assistant", "content": "hi there"}));

    let again = printed(process_input(&mut state, &format!("/save {}", path.display())));
    assert!(again.starts_with("Save error"));
}

#[test]
fn pretty_prints_roles_in_order() {
    let mut state = chat_state();
    state.conversation.append_assistant("reply");
    let text = printed(process_input(&mut state, "/pretty"));
    assert_eq!(text, "[system]\nsys\n\n[user]\nseed\n\n[assistant]\nreply");
    assert_eq!(state.conversation.transcript()[2].role, Role::Assistant);
}

#[test]
fn multiline_sets_collection_mode() {
    let mut state = chat_state();
    process_input(&mut state, "/multiline");
    assert!(state.multiline);
}

#[test]
fn tools_toggle_the_enabled_set_only() {
    let mut state = ChatState::new(ConversationState::new(None), Some(tool_registry()));
    assert_eq!(offered(&state).map(|d| d.len()), Some(2));

    assert_eq!(printed(process_input(&mut state, "/tools disable clock")), "Disabled clock");
    let listing = printed(process_input(&mut state, "/tools"));
    assert!(listing.contains("[ ] clock  clock tool"));
    assert!(listing.contains("[x] weather  weather tool"));
    assert_eq!(offered(&state).map(|d| d.len()), Some(1));

    assert_eq!(printed(process_input(&mut state, "/tools enable clock")), "Enabled clock");
    assert_eq!(printed(process_input(&mut state, "/tools enable nope")), "Unknown tool: nope");
    assert!(printed(process_input(&mut state, "/tools frob")).starts_with("Usage"));

    let mut bare = chat_state();
    assert_eq!(printed(process_input(&mut bare, "/tools")), "No tools are configured.");
}

#[test]
fn tools_switched_off_in_their_file_start_disabled() {
    let mut tools = BTreeMap::new();
    tools.insert(
        "shell".to_string(),
        ToolSpec {
            description: None,
            parameters: json!({"type": "object"}),
            command: vec!["sh".to_string()],
            enabled: false,
        },
    );
    let registry = Arc::new(ToolRegistry::new(tools).expect("registry"));
    let mut state = ChatState::new(ConversationState::new(None), Some(registry));

    assert!(state.enabled_tools.is_empty());
    assert_eq!(printed(process_input(&mut state, "/tools enable shell")), "Enabled shell");
    assert_eq!(offered(&state).map(|d| d.len()), Some(1));
}
