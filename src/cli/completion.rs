//! One prompt, one streamed answer.

use std::error::Error;
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;

use tokio_util::sync::CancellationToken;

use crate::cli::setup::{cancel_on_interrupt, renderer, Setup};
use crate::cli::turn::{run_exchange, ToolScope};
use crate::cli::{Args, PromptSource};
use crate::core::error::{ConfigError, SessionError};

/// Joins the prompt with piped input, separated by a blank line.
fn combine_prompt(prompt: &str, piped: Option<&str>) -> String {
    match piped.map(str::trim_end).filter(|text| !text.trim().is_empty()) {
        Some(text) => format!("{prompt}\n\n{text}"),
        None => prompt.to_string(),
    }
}

fn read_prompt(source: &PromptSource) -> Result<String, Box<dyn Error>> {
    let prompt = match (&source.prompt, &source.prompt_file) {
        (Some(prompt), _) => prompt.clone(),
        (None, Some(path)) => fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?,
        (None, None) => return Err("a prompt is required (--prompt or --prompt-file)".into()),
    };

    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(prompt);
    }
    let mut piped = String::new();
    stdin.lock().read_to_string(&mut piped)?;
    Ok(combine_prompt(&prompt, Some(&piped)))
}

pub async fn run_completion(args: &Args, source: &PromptSource) -> Result<ExitCode, Box<dyn Error>> {
    let prompt = read_prompt(source)?;
    let setup = Setup::load(args).await?;
    let mut conversation = setup.conversation(args, setup.system_prompt(args)?)?;
    conversation.append_user(&prompt);

    let cancel = CancellationToken::new();
    let interrupt = cancel_on_interrupt(cancel.clone());
    let session = setup.session(cancel);
    let enabled = setup.enabled_tools();
    let tools = setup.tools.as_deref().map(|registry| ToolScope {
        registry,
        enabled: &enabled,
    });
    let mut renderer = renderer(args);

    let result = run_exchange(
        &session,
        &setup.builder,
        &mut conversation,
        tools,
        renderer.as_mut(),
    )
    .await;
    interrupt.abort();

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(SessionError::Cancelled { .. }) => {
            eprintln!("⚠️  Response cancelled");
            Ok(ExitCode::from(130))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piped_input_follows_a_blank_line() {
        assert_eq!(combine_prompt("Summarise:", Some("line one\nline two\n")), "Summarise:\n\nline one\nline two");
        assert_eq!(combine_prompt("Hi", Some("  \n")), "Hi");
        assert_eq!(combine_prompt("Hi", None), "Hi");
    }
}
