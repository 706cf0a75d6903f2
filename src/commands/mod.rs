mod registry;

pub use registry::{all_commands, CommandInvocation};

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::Local;

use crate::core::conversation::ConversationState;
use crate::core::tools::ToolRegistry;

/// Mutable state of one interactive chat.
pub struct ChatState {
    pub conversation: ConversationState,
    pub tools: Option<Arc<ToolRegistry>>,
    /// Tools currently offered to the model; starts with all of them.
    pub enabled_tools: BTreeSet<String>,
    pub multiline: bool,
}

impl ChatState {
    pub fn new(conversation: ConversationState, tools: Option<Arc<ToolRegistry>>) -> Self {
        let enabled_tools = tools
            .as_deref()
            .map(ToolRegistry::initially_enabled)
            .unwrap_or_default();
        Self {
            conversation,
            tools,
            enabled_tools,
            multiline: false,
        }
    }
}

pub enum CommandResult {
    Continue,
    Print(String),
    ProcessAsMessage(String),
    Quit,
}

pub fn process_input(state: &mut ChatState, input: &str) -> CommandResult {
    let trimmed = input.trim();

    if !trimmed.starts_with('/') {
        return CommandResult::ProcessAsMessage(input.to_string());
    }

    let mut parts = trimmed[1..].splitn(2, ' ');
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return CommandResult::ProcessAsMessage(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    if let Some(command) = registry::find_command(command_name) {
        let invocation = CommandInvocation {
            input: trimmed,
            args,
        };
        (command.handler)(state, invocation)
    } else {
        CommandResult::ProcessAsMessage(input.to_string())
    }
}

pub(super) fn handle_help(_state: &mut ChatState, _invocation: CommandInvocation<'_>) -> CommandResult {
    let width = all_commands()
        .iter()
        .map(|command| command.usage.len())
        .max()
        .unwrap_or(0);
    let mut help = String::from("Commands:\n");
    for command in all_commands() {
        help.push_str(&format!("  {:width$}  {}\n", command.usage, command.help));
    }
    help.push_str("Ctrl-C interrupts a response; Ctrl-D exits.");
    CommandResult::Print(help)
}

pub(super) fn handle_reset(state: &mut ChatState, _invocation: CommandInvocation<'_>) -> CommandResult {
    state.conversation.reset();
    CommandResult::Print("Conversation reset.".to_string())
}

pub(super) fn handle_save(state: &mut ChatState, invocation: CommandInvocation<'_>) -> CommandResult {
    let filename = if invocation.args.is_empty() {
        format!("qq-chat-{}.jsonl", Local::now().format("%Y%m%d-%H%M%S"))
    } else {
        invocation.args.to_string()
    };

    match save_transcript(&state.conversation, Path::new(&filename)) {
        Ok(count) => CommandResult::Print(format!("Saved {count} turns to {filename}")),
        Err(e) => CommandResult::Print(format!("Save error: {e}")),
    }
}

/// Writes the transcript one JSON turn per line. Never overwrites.
pub fn save_transcript(conversation: &ConversationState, path: &Path) -> io::Result<usize> {
    let transcript = conversation.transcript();
    if transcript.is_empty() {
        return Err(io::Error::other("the conversation is empty"));
    }

    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let mut writer = BufWriter::new(file);
    for turn in &transcript {
        serde_json::to_writer(&mut writer, turn)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(transcript.len())
}

pub(super) fn handle_pretty(state: &mut ChatState, _invocation: CommandInvocation<'_>) -> CommandResult {
    let transcript = state.conversation.transcript();
    if transcript.is_empty() {
        return CommandResult::Print("(empty conversation)".to_string());
    }

    let mut out = String::new();
    for turn in transcript {
        out.push_str(&format!("[{}]\n", turn.role.as_str()));
        if let Some(calls) = &turn.tool_calls {
            for call in calls {
                out.push_str(&format!("→ {}({})\n", call.function.name, call.function.arguments));
            }
        }
        if !turn.content.is_empty() {
            out.push_str(turn.content.trim_end());
            out.push('\n');
        }
        out.push('\n');
    }
    CommandResult::Print(out.trim_end().to_string())
}

pub(super) fn handle_undo(state: &mut ChatState, _invocation: CommandInvocation<'_>) -> CommandResult {
    match state.conversation.undo_exchange() {
        Some(_) => CommandResult::Print("Removed the last exchange.".to_string()),
        None => CommandResult::Print("Nothing to undo.".to_string()),
    }
}

pub(super) fn handle_redo(state: &mut ChatState, _invocation: CommandInvocation<'_>) -> CommandResult {
    match state.conversation.undo_exchange() {
        Some(prompt) => CommandResult::ProcessAsMessage(prompt),
        None => CommandResult::Print("Nothing to redo.".to_string()),
    }
}

pub(super) fn handle_multiline(state: &mut ChatState, _invocation: CommandInvocation<'_>) -> CommandResult {
    state.multiline = true;
    CommandResult::Print("Multiline input: finish with /multiline on its own line.".to_string())
}

pub(super) fn handle_tools(state: &mut ChatState, invocation: CommandInvocation<'_>) -> CommandResult {
    let Some(registry) = state.tools.clone() else {
        return CommandResult::Print("No tools are configured.".to_string());
    };

    let mut parts = invocation.args.split_whitespace();
    match (parts.next(), parts.next()) {
        (None | Some("list"), None) => {
            let mut out = String::from("Tools:");
            for name in registry.names() {
                let mark = if state.enabled_tools.contains(name) { "x" } else { " " };
                let description = registry
                    .get(name)
                    .and_then(|spec| spec.description.as_deref())
                    .unwrap_or("");
                out.push_str(&format!("\n  [{mark}] {name}  {description}"));
            }
            CommandResult::Print(out.trim_end().to_string())
        }
        (Some(action @ ("enable" | "disable")), Some(name)) => {
            if registry.get(name).is_none() {
                return CommandResult::Print(format!("Unknown tool: {name}"));
            }
            if action == "enable" {
                state.enabled_tools.insert(name.to_string());
                CommandResult::Print(format!("Enabled {name}"))
            } else {
                state.enabled_tools.remove(name);
                CommandResult::Print(format!("Disabled {name}"))
            }
        }
        _ => CommandResult::Print("Usage: /tools [list|enable <name>|disable <name>]".to_string()),
    }
}

pub(super) fn handle_quit(_state: &mut ChatState, _invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Quit
}

#[cfg(test)]
mod tests;
