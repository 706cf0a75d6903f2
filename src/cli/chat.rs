//! Interactive chat loop.

use std::error::Error;
use std::io;
use std::process::ExitCode;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cli::setup::{cancel_on_interrupt, renderer, Setup};
use crate::cli::turn::{run_exchange, ToolScope};
use crate::cli::Args;
use crate::commands::{process_input, ChatState, CommandResult};
use crate::core::config::io::config_dir;
use crate::core::error::SessionError;
use crate::ui::renderer::Renderer;

const PROMPT: &str = "> ";
const CONTINUATION_PROMPT: &str = ". ";
const MULTILINE_MARKER: &str = "/multiline";

enum Line {
    Text(String),
    Interrupted,
    Eof,
}

fn read_line(editor: &mut DefaultEditor, prompt: &str) -> Result<Line, ReadlineError> {
    match tokio::task::block_in_place(|| editor.readline(prompt)) {
        Ok(line) => {
            if !line.trim().is_empty() {
                let _ = editor.add_history_entry(line.as_str());
            }
            Ok(Line::Text(line))
        }
        Err(ReadlineError::Interrupted) => Ok(Line::Interrupted),
        Err(ReadlineError::Eof) => Ok(Line::Eof),
        Err(e) => Err(e),
    }
}

/// Lines up to the closing marker, joined with newlines. `None` when input
/// ends or is interrupted first.
fn read_multiline(editor: &mut DefaultEditor) -> Result<Option<String>, ReadlineError> {
    let mut lines = Vec::new();
    loop {
        match read_line(editor, CONTINUATION_PROMPT)? {
            Line::Text(line) if line.trim() == MULTILINE_MARKER => {
                return Ok(Some(lines.join("\n")));
            }
            Line::Text(line) => lines.push(line),
            Line::Interrupted | Line::Eof => return Ok(None),
        }
    }
}

/// One exchange with Ctrl-C cancelling only this response.
async fn send(
    setup: &Setup,
    state: &mut ChatState,
    renderer: &mut dyn Renderer,
    text: &str,
) -> Result<(), SessionError> {
    state.conversation.append_user(text);

    let cancel = CancellationToken::new();
    let interrupt = cancel_on_interrupt(cancel.clone());
    let session = setup.session(cancel);
    let tools = state.tools.as_deref().map(|registry| ToolScope {
        registry,
        enabled: &state.enabled_tools,
    });

    let result = run_exchange(
        &session,
        &setup.builder,
        &mut state.conversation,
        tools,
        renderer,
    )
    .await;
    interrupt.abort();

    // Nothing was streamed back: drop the unanswered prompt so the next
    // message does not follow a dangling user turn.
    if result.is_err() && state.conversation.awaiting_response() {
        state.conversation.undo_exchange();
    }
    result
}

#[derive(Debug, PartialEq, Eq)]
enum AfterResponse {
    Prompt,
    Exit,
}

/// A cancelled response returns to the prompt. Any other failure ends the
/// chat once its partial text is in the history.
fn after_response(
    result: Result<(), SessionError>,
    renderer: &mut dyn Renderer,
) -> io::Result<AfterResponse> {
    match result {
        Ok(()) => Ok(AfterResponse::Prompt),
        Err(SessionError::Cancelled { .. }) => {
            renderer.notice("⚠️  Response cancelled")?;
            Ok(AfterResponse::Prompt)
        }
        Err(e) => {
            warn!(error = %e, "response failed");
            renderer.notice(&format!("❌ {e}"))?;
            Ok(AfterResponse::Exit)
        }
    }
}

pub async fn run_chat(args: &Args) -> Result<ExitCode, Box<dyn Error>> {
    let setup = Setup::load(args).await?;
    let mut conversation = setup.conversation(args, setup.system_prompt(args)?)?;
    conversation.mark_baseline();
    let mut state = ChatState::new(conversation, setup.tools.clone());
    let mut renderer = renderer(args);

    let mut editor = DefaultEditor::new()?;
    let history_path = config_dir().join("history.txt");
    if editor.load_history(&history_path).is_err() {
        debug!(path = %history_path.display(), "no chat history yet");
    }

    eprintln!(
        "💬 {} ({}). /help for commands, Ctrl-D to exit.",
        setup.profile.name,
        setup.builder.model()
    );

    let mut exit = ExitCode::SUCCESS;
    loop {
        let input = match read_line(&mut editor, PROMPT)? {
            Line::Text(line) => line,
            Line::Interrupted => continue,
            Line::Eof => break,
        };
        if input.trim().is_empty() {
            continue;
        }

        let message = match process_input(&mut state, &input) {
            CommandResult::Continue => continue,
            CommandResult::Print(text) => {
                println!("{text}");
                if !state.multiline {
                    continue;
                }
                state.multiline = false;
                match read_multiline(&mut editor)? {
                    Some(text) if !text.trim().is_empty() => text,
                    _ => continue,
                }
            }
            CommandResult::ProcessAsMessage(text) => text,
            CommandResult::Quit => break,
        };

        let result = send(&setup, &mut state, renderer.as_mut(), &message).await;
        if after_response(result, renderer.as_mut())? == AfterResponse::Exit {
            exit = ExitCode::FAILURE;
            break;
        }
    }

    if let Err(e) = editor.save_history(&history_path) {
        debug!(error = %e, "could not save chat history");
    }
    Ok(exit)
}
