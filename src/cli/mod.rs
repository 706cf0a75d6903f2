//! Command-line interface parsing and handling
//!
//! This module parses arguments, sets up logging, and dispatches to the
//! completion, chat, template, and list commands.

pub mod chat;
pub mod completion;
pub mod list;
pub mod setup;
pub mod template;
mod turn;

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::core::constants::{DEFAULT_COT_WRITER, DEFAULT_PROFILE};
use crate::utils::logging::init_tracing;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "qq")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Quick queries against OpenAI-compatible chat endpoints")]
#[command(
    long_about = "qq sends prompts to an OpenAI-compatible /chat/completions endpoint and \
streams the answer to stdout. Chain-of-thought text (between <think> markers, or \
structured reasoning deltas) is routed to a separate writer so that stdout only \
carries the answer.\n\n\
Configuration:\n\
  conf.toml         Profiles and credentials (see --conf-file)\n\
  prompts.toml      Named system prompts (see --system-prompt-file)\n\n\
Environment Variables:\n\
  QQ_LOG            Tracing filter for diagnostics (e.g. qq=debug)\n\n\
Modes:\n\
  completion        One prompt, one answer\n\
  chat              Interactive conversation with slash commands (/help)\n\
  template          Render a template per JSON record and run the jobs concurrently\n\
  list              Show configured profiles and system prompts"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Profiles and credentials file
    #[arg(long, global = true, value_name = "PATH")]
    pub conf_file: Option<PathBuf>,

    /// Named system prompts file
    #[arg(long, global = true, value_name = "PATH")]
    pub system_prompt_file: Option<PathBuf>,

    /// System prompt to use instead of the profile's
    #[arg(long, visible_alias = "sp", global = true, value_name = "NAME")]
    pub system_prompt_name: Option<String>,

    /// Profile to use
    #[arg(short = 's', long, global = true, default_value = DEFAULT_PROFILE)]
    pub profile: String,

    /// Model to use instead of the profile's
    #[arg(long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Tool definition file (repeatable)
    #[arg(short = 't', long = "tools", global = true, value_name = "PATH")]
    pub tools: Vec<String>,

    /// Render answers as markdown
    #[arg(short = 'm', long, global = true)]
    pub format_markdown: bool,

    /// Where chain-of-thought text goes: a path or a file descriptor number
    #[arg(long, global = true, value_name = "TARGET", default_value = DEFAULT_COT_WRITER)]
    pub cot_block_fd: String,

    /// Tag delimiting chain-of-thought text; empty disables detection
    #[arg(long, global = true, value_name = "TAG")]
    pub cot_token: Option<String>,

    /// Characters gathered before a chunk is released
    #[arg(long, global = true, value_name = "N")]
    pub min_chunk_size: Option<usize>,

    /// Ask the model to read each question twice
    #[arg(long, global = true)]
    pub re2: bool,

    /// Strip chain-of-thought regions from answers before they enter history
    #[arg(long, global = true)]
    pub rethink: bool,

    /// Custom re-think pattern (regex); implies --rethink
    #[arg(long, global = true, value_name = "REGEX")]
    pub rethink_pattern: Option<String>,

    /// Replacement used with --rethink-pattern
    #[arg(long, global = true, value_name = "TEXT", default_value = "")]
    pub rethink_replacement: String,

    /// Debug diagnostics for qq (overridden by QQ_LOG)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Write diagnostics to a file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one prompt and print the answer
    Completion(PromptSource),
    /// Start an interactive chat
    Chat,
    /// Run a prompt template once per JSON record
    Template(TemplateArgs),
    /// Show configured profiles and system prompts
    List {
        /// Show profiles (api keys are redacted)
        #[arg(long)]
        profiles: bool,
        /// Show system prompts
        #[arg(long)]
        system_prompts: bool,
    },
}

#[derive(ClapArgs, Debug)]
#[group(required = true, multiple = false)]
pub struct PromptSource {
    /// Prompt text
    #[arg(short = 'p', long)]
    pub prompt: Option<String>,

    /// Read the prompt from a file
    #[arg(short = 'f', long, value_name = "PATH")]
    pub prompt_file: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct TemplateArgs {
    #[command(flatten)]
    pub template: TemplateInput,

    #[command(flatten)]
    pub variables: VariablesInput,

    /// Write JSONL results here instead of stdout
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Jobs in flight at once (default: available parallelism)
    #[arg(short = 'c', long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Write results in input order instead of completion order
    #[arg(long)]
    pub ordered: bool,
}

#[derive(ClapArgs, Debug)]
#[group(required = true, multiple = false)]
pub struct TemplateInput {
    /// File holding the prompt template
    #[arg(long, value_name = "PATH")]
    pub template_from_file: Option<PathBuf>,

    /// Record field holding each record's own template
    #[arg(long, value_name = "FIELD")]
    pub template_from_field: Option<String>,
}

#[derive(ClapArgs, Debug)]
#[group(required = true, multiple = false)]
pub struct VariablesInput {
    /// Inline JSON: one object or an array of objects
    #[arg(long, value_name = "JSON")]
    pub variables: Option<String>,

    /// JSONL file with one object per line; `-` reads stdin
    #[arg(long, value_name = "PATH")]
    pub variables_from_file: Option<PathBuf>,
}

pub fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(args.verbose, args.log_file.as_deref()) {
        eprintln!("⚠️  Logging disabled: {e}");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("❌ Failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(async_main(args));
    // A template source blocked on stdin must not hold up exit.
    runtime.shutdown_background();

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

async fn async_main(args: Args) -> Result<ExitCode, Box<dyn Error>> {
    match &args.command {
        Commands::Completion(source) => completion::run_completion(&args, source).await,
        Commands::Chat => chat::run_chat(&args).await,
        Commands::Template(template) => template::run_template(&args, template).await,
        Commands::List {
            profiles,
            system_prompts,
        } => {
            list::run_list(&args, *profiles, *system_prompts)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
