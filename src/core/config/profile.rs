//! Resolved, immutable connection profile.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::core::assembler::DelimiterTag;
use crate::core::config::data::{ConfigFile, PromptBook, ProfileEntry};
use crate::core::constants::{DEFAULT_COT_TAG, DEFAULT_MIN_CHUNK_SIZE, DEFAULT_PROMPT_NAME};
use crate::core::endpoint::check_host;
use crate::core::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub model: Option<String>,
    pub host: String,
    pub api_key: Option<String>,
    pub prompt_name: Option<String>,
    pub tool_files: Vec<String>,
    pub structured_streaming: bool,
    /// `None` disables thought detection.
    pub cot_tag: Option<String>,
    pub min_chunk_size: usize,
    pub rethink: bool,
    pub parameters: Map<String, Value>,
    pub extra: BTreeMap<String, toml::Value>,
}

/// Command-line values that win over the profile's own settings.
#[derive(Debug, Clone, Default)]
pub struct ProfileOverrides {
    pub model: Option<String>,
    pub cot_tag: Option<String>,
    pub min_chunk_size: Option<usize>,
    pub rethink: bool,
    pub tool_files: Vec<String>,
}

impl Profile {
    pub fn delimiter(&self) -> Option<DelimiterTag> {
        self.cot_tag.as_deref().map(DelimiterTag::new)
    }

    pub fn with_overrides(mut self, overrides: ProfileOverrides) -> Self {
        if overrides.model.is_some() {
            self.model = overrides.model;
        }
        if let Some(tag) = overrides.cot_tag {
            self.cot_tag = (!tag.is_empty()).then_some(tag);
        }
        if let Some(size) = overrides.min_chunk_size {
            self.min_chunk_size = size;
        }
        self.rethink |= overrides.rethink;
        // CLI tool files load first, then the profile's.
        let mut tool_files = overrides.tool_files;
        tool_files.append(&mut self.tool_files);
        self.tool_files = tool_files;
        self
    }

    fn from_entry(name: &str, entry: &ProfileEntry, config: &ConfigFile) -> Result<Self, ConfigError> {
        let credentials = match entry.credentials.as_deref() {
            Some(key) => Some(config.credentials.get(key).ok_or_else(|| {
                ConfigError::UnknownCredentials {
                    profile: name.to_string(),
                    credentials: key.to_string(),
                }
            })?),
            None => None,
        };

        let host = credentials
            .and_then(|c| c.host.clone())
            .ok_or_else(|| ConfigError::MissingCredential {
                profile: name.to_string(),
                field: "host",
            })?;
        check_host(&host).map_err(|reason| ConfigError::Invalid {
            field: "host",
            reason,
        })?;

        Ok(Profile {
            name: name.to_string(),
            model: entry.model.clone(),
            host,
            api_key: credentials
                .and_then(|c| c.api_key.clone())
                .filter(|key| !key.is_empty()),
            prompt_name: entry.prompt.clone(),
            tool_files: entry
                .tools
                .clone()
                .map(|tools| tools.into_vec())
                .unwrap_or_default(),
            structured_streaming: entry.structured_streaming.unwrap_or(true),
            cot_tag: match entry.cot_token.as_deref() {
                Some("") => None,
                Some(tag) => Some(tag.to_string()),
                None => Some(DEFAULT_COT_TAG.to_string()),
            },
            min_chunk_size: entry.min_chunk_size.unwrap_or(DEFAULT_MIN_CHUNK_SIZE),
            rethink: entry.rethink.unwrap_or(false),
            parameters: entry.parameters.clone(),
            extra: entry.extra.clone(),
        })
    }
}

impl ConfigFile {
    pub fn resolve_profile(&self, name: &str, path: &Path) -> Result<Profile, ConfigError> {
        let entry = self
            .profile
            .get(name)
            .ok_or_else(|| ConfigError::MissingProfile {
                name: name.to_string(),
                path: path.to_path_buf(),
            })?;
        Profile::from_entry(name, entry, self)
    }

    /// Every profile in file order, each resolved independently so one broken
    /// entry does not hide the rest.
    pub fn resolve_all(&self) -> Vec<(String, Result<Profile, ConfigError>)> {
        self.profile
            .iter()
            .map(|(name, entry)| (name.clone(), Profile::from_entry(name, entry, self)))
            .collect()
    }
}

impl PromptBook {
    /// Picks the system prompt: explicit name, then the profile's `prompt`,
    /// then `default`. Only an explicitly requested prompt must exist.
    pub fn resolve_system_prompt(
        &self,
        explicit: Option<&str>,
        profile: &Profile,
        path: &Path,
    ) -> Result<Option<String>, ConfigError> {
        let requested = explicit.or(profile.prompt_name.as_deref());
        let name = requested.unwrap_or(DEFAULT_PROMPT_NAME);
        match self.get(name) {
            Some(prompt) => Ok(Some(prompt.to_string())),
            None if requested.is_some() => Err(ConfigError::MissingPrompt {
                name: name.to_string(),
                path: path.to_path_buf(),
            }),
            None => Ok(None),
        }
    }
}
