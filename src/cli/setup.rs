//! Shared startup: configuration, model, transport, and renderer.

use std::collections::BTreeSet;
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::models::first_model_id;
use crate::cli::Args;
use crate::core::chat_stream::{CompletionTransport, HttpTransport};
use crate::core::config::{ConfigFile, Profile, ProfileOverrides, PromptBook};
use crate::core::conversation::ConversationState;
use crate::core::error::ConfigError;
use crate::core::payload::PayloadBuilder;
use crate::core::rethink::{re_read_rewrite, RethinkRewrite};
use crate::core::session::StreamingSession;
use crate::core::tools::{load_if_any, ToolRegistry};
use crate::ui::renderer::{build_renderer, open_cot_writer, RenderFormat, Renderer};

/// Everything a mode needs once configuration is resolved.
pub struct Setup {
    pub profile: Arc<Profile>,
    pub prompts: PromptBook,
    pub prompts_path: PathBuf,
    pub transport: Arc<dyn CompletionTransport>,
    pub builder: PayloadBuilder,
    pub tools: Option<Arc<ToolRegistry>>,
}

pub fn config_path(args: &Args) -> PathBuf {
    args.conf_file.clone().unwrap_or_else(ConfigFile::default_path)
}

pub fn prompts_path(args: &Args) -> PathBuf {
    args.system_prompt_file
        .clone()
        .unwrap_or_else(PromptBook::default_path)
}

fn overrides(args: &Args) -> ProfileOverrides {
    ProfileOverrides {
        model: args.model.clone(),
        cot_tag: args.cot_token.clone(),
        min_chunk_size: args.min_chunk_size,
        rethink: args.rethink || args.rethink_pattern.is_some(),
        tool_files: args.tools.clone(),
    }
}

/// The selected profile with command-line overrides applied.
pub fn load_profile(args: &Args) -> Result<Profile, ConfigError> {
    let path = config_path(args);
    let config = ConfigFile::load_from_path(&path)?;
    let profile = config
        .resolve_profile(&args.profile, &path)?
        .with_overrides(overrides(args));
    debug!(profile = %profile.name, host = %profile.host, "profile resolved");
    Ok(profile)
}

/// The profile's model, or the first one the endpoint advertises.
async fn resolve_model(client: &reqwest::Client, profile: &Profile) -> Result<String, Box<dyn Error>> {
    if let Some(model) = &profile.model {
        return Ok(model.clone());
    }
    let api_key = profile.api_key.as_deref().unwrap_or_default();
    match first_model_id(client, &profile.host, api_key).await? {
        Some(model) => {
            info!(profile = %profile.name, model = %model, "using first advertised model");
            Ok(model)
        }
        None => Err(ConfigError::NoModel(profile.name.clone()).into()),
    }
}

impl Setup {
    pub async fn load(args: &Args) -> Result<Self, Box<dyn Error>> {
        let profile = load_profile(args)?;
        let prompts_path = prompts_path(args);
        let prompts = PromptBook::load_from_path(&prompts_path)?;
        let tools = load_if_any(&profile.tool_files)?.map(Arc::new);

        let client = reqwest::Client::new();
        let model = resolve_model(&client, &profile).await?;
        let transport: Arc<dyn CompletionTransport> = Arc::new(HttpTransport::new(
            client,
            profile.host.clone(),
            profile.api_key.clone(),
            profile.structured_streaming,
        ));
        let builder = PayloadBuilder::new(&profile, model);
        info!(profile = %profile.name, model = %builder.model(), "session configured");

        Ok(Self {
            profile: Arc::new(profile),
            prompts,
            prompts_path,
            transport,
            builder,
            tools,
        })
    }

    /// The system prompt for completion and chat; an explicitly named prompt
    /// must exist.
    pub fn system_prompt(&self, args: &Args) -> Result<Option<String>, ConfigError> {
        self.prompts.resolve_system_prompt(
            args.system_prompt_name.as_deref(),
            &self.profile,
            &self.prompts_path,
        )
    }

    /// A conversation with the system prompt and the rewrites selected by
    /// `--re2` and re-think settings.
    pub fn conversation(
        &self,
        args: &Args,
        system: Option<String>,
    ) -> Result<ConversationState, ConfigError> {
        let mut conversation = ConversationState::new(system);
        if args.re2 {
            conversation = conversation.with_user_rewrite(re_read_rewrite());
        }
        if let Some(pattern) = &args.rethink_pattern {
            let rewrite = RethinkRewrite::new(pattern, args.rethink_replacement.clone())?;
            conversation = conversation.with_assistant_rewrite(rewrite.into_rewrite());
        } else if self.profile.rethink {
            let tag = self.profile.delimiter().unwrap_or_default();
            conversation =
                conversation.with_assistant_rewrite(RethinkRewrite::strip_tag(&tag)?.into_rewrite());
        }
        Ok(conversation)
    }

    pub fn session(&self, cancel: CancellationToken) -> StreamingSession {
        StreamingSession::new(
            Arc::clone(&self.transport),
            self.profile.delimiter(),
            self.profile.min_chunk_size,
        )
        .with_cancel(cancel)
    }

    /// Tools not switched off in their definition.
    pub fn enabled_tools(&self) -> BTreeSet<String> {
        self.tools
            .as_deref()
            .map(ToolRegistry::initially_enabled)
            .unwrap_or_default()
    }
}

pub fn renderer(args: &Args) -> Box<dyn Renderer> {
    let format = if args.format_markdown {
        RenderFormat::Markdown
    } else {
        RenderFormat::Plain
    };
    let (cot, styled) = open_cot_writer(&args.cot_block_fd);
    build_renderer(format, Box::new(io::stdout()), cot, styled)
}

/// Cancels `token` on the first Ctrl-C. Abort the handle once the guarded
/// work is over so later interrupts reach their own handler.
pub fn cancel_on_interrupt(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received");
            token.cancel();
        }
    })
}
