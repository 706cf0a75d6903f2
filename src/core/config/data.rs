use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Raw contents of `conf.toml` after environment expansion.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub profile: BTreeMap<String, ProfileEntry>,
    #[serde(default)]
    pub credentials: BTreeMap<String, CredentialsEntry>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ProfileEntry {
    pub model: Option<String>,
    /// Name of a `[credentials.<name>]` table.
    pub credentials: Option<String>,
    /// Name of a system prompt section in `prompts.toml`.
    pub prompt: Option<String>,
    #[serde(default)]
    pub tools: Option<ToolFiles>,
    pub structured_streaming: Option<bool>,
    pub cot_token: Option<String>,
    pub min_chunk_size: Option<usize>,
    pub rethink: Option<bool>,
    /// Extra request body fields (temperature, max_tokens, ...).
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Anything else; kept so `qq list --profiles` can show it.
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ToolFiles {
    One(String),
    Many(Vec<String>),
}

impl ToolFiles {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            ToolFiles::One(path) => vec![path],
            ToolFiles::Many(paths) => paths,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct CredentialsEntry {
    pub host: Option<String>,
    pub api_key: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

/// Contents of `prompts.toml`: one `[section]` per named system prompt.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(transparent)]
pub struct PromptBook {
    pub sections: BTreeMap<String, PromptEntry>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PromptEntry {
    pub prompt: Option<String>,
}

impl PromptBook {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.sections
            .get(name)
            .and_then(|entry| entry.prompt.as_deref())
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

/// Expands a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = directories::BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}
