use super::{ChatState, CommandResult};

pub type CommandHandler = fn(&mut ChatState, CommandInvocation<'_>) -> CommandResult;

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    pub input: &'a str,
    pub args: &'a str,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands()
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "/help",
        help: "Show available commands.",
        handler: super::handle_help,
    },
    Command {
        name: "reset",
        usage: "/reset",
        help: "Drop the conversation back to its initial turns.",
        handler: super::handle_reset,
    },
    Command {
        name: "save",
        usage: "/save [path]",
        help: "Write the history as JSONL (default: timestamped file).",
        handler: super::handle_save,
    },
    Command {
        name: "pretty",
        usage: "/pretty",
        help: "Print the conversation history.",
        handler: super::handle_pretty,
    },
    Command {
        name: "undo",
        usage: "/undo",
        help: "Remove the last exchange.",
        handler: super::handle_undo,
    },
    Command {
        name: "redo",
        usage: "/redo",
        help: "Remove the last exchange and send its prompt again.",
        handler: super::handle_redo,
    },
    Command {
        name: "multiline",
        usage: "/multiline",
        help: "Collect lines until /multiline is entered again.",
        handler: super::handle_multiline,
    },
    Command {
        name: "tools",
        usage: "/tools [list|enable <name>|disable <name>]",
        help: "Inspect or toggle the tools offered to the model.",
        handler: super::handle_tools,
    },
    Command {
        name: "quit",
        usage: "/quit",
        help: "Leave the chat (Ctrl-D also works).",
        handler: super::handle_quit,
    },
];
