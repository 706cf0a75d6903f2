//! Shared constants used across the application

/// Tag name whose `<tag>`/`</tag>` markers delimit chain-of-thought text.
pub const DEFAULT_COT_TAG: &str = "think";

/// Characters coalesced per polarity before an event is released.
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 10;

/// Where thought text goes unless `--cot-block-fd` says otherwise.
pub const DEFAULT_COT_WRITER: &str = "/dev/tty";

pub const DEFAULT_PROFILE: &str = "default";

pub const DEFAULT_PROMPT_NAME: &str = "default";

/// System prompt used by template mode when none is configured.
pub const TEMPLATE_FALLBACK_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Re-read prompting: the question is stated twice.
pub const RE2_TEMPLATE: &str = "{message}\nRead the question again:\n{message}";

pub const CONFIG_FILE_NAME: &str = "conf.toml";

pub const PROMPTS_FILE_NAME: &str = "prompts.toml";

/// Env var consulted for the tracing filter before `--verbose`.
pub const LOG_ENV_VAR: &str = "QQ_LOG";
