//! Function-calling tools backed by external commands.
//!
//! Tool files are TOML:
//!
//! ```toml
//! [tools.clock]
//! description = "Current local time"
//! command = ["date", "+%H:%M"]
//! parameters = { type = "object", properties = {} }
//! enabled = false
//! ```
//!
//! A later file may redefine a tool from an earlier one. The registry is built once at startup and never mutated; which tools a
//! chat offers to the model is tracked separately by the caller.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::process::Stdio;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::api::{ChatToolCall, ChatToolDefinition, ChatToolFunction};
use crate::core::config::data::expand_home;
use crate::core::config::io::load_expanded;
use crate::core::error::{ConfigError, ToolError};

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolSpec {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
    /// Program and arguments; the call's JSON arguments arrive on stdin.
    pub command: Vec<String>,
    /// Offered from the start; a disabled tool can still be enabled in chat.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ToolFile {
    #[serde(default)]
    tools: BTreeMap<String, ToolSpec>,
}

#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolSpec>,
}

impl ToolRegistry {
    pub fn new(tools: BTreeMap<String, ToolSpec>) -> Result<Self, ConfigError> {
        for (name, spec) in &tools {
            validate(name, spec)?;
        }
        Ok(Self { tools })
    }

    /// Loads every file in order; a later definition replaces an earlier
    /// one with the same name.
    pub fn load(paths: &[String]) -> Result<Self, ConfigError> {
        let mut tools = BTreeMap::new();
        for raw in paths {
            let path = expand_home(raw);
            if !path.exists() {
                return Err(ConfigError::Tool {
                    name: raw.clone(),
                    reason: "tool file not found".to_string(),
                });
            }
            let file: ToolFile = load_expanded(&path)?;
            debug!(path = %path.display(), count = file.tools.len(), "loaded tool file");
            for (name, spec) in file.tools {
                if tools.insert(name.clone(), spec).is_some() {
                    warn!(tool = %name, path = %path.display(), "tool redefined by a later file");
                }
            }
        }
        Self::new(tools)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    /// Names of the tools offered before any `/tools` change.
    pub fn initially_enabled(&self) -> BTreeSet<String> {
        self.tools
            .iter()
            .filter(|(_, spec)| spec.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Request-side definitions for the enabled subset, in name order.
    pub fn definitions(&self, enabled: &BTreeSet<String>) -> Vec<ChatToolDefinition> {
        self.tools
            .iter()
            .filter(|(name, _)| enabled.contains(*name))
            .map(|(name, spec)| ChatToolDefinition {
                kind: "function".to_string(),
                function: ChatToolFunction {
                    name: name.clone(),
                    description: spec.description.clone(),
                    parameters: spec.parameters.clone(),
                },
            })
            .collect()
    }

    /// Runs the command behind `call` and returns its stdout.
    pub async fn invoke(
        &self,
        call: &ChatToolCall,
        enabled: &BTreeSet<String>,
    ) -> Result<String, ToolError> {
        let name = call.function.name.as_str();
        let spec = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;
        if !enabled.contains(name) {
            return Err(ToolError::Disabled(name.to_string()));
        }

        let arguments = parse_arguments(name, &call.function.arguments)?;
        let (program, args) = spec
            .command
            .split_first()
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;

        info!(tool = name, id = %call.id, "running tool");
        let spawn_err = |source| ToolError::Spawn {
            name: name.to_string(),
            source,
        };
        let mut child = Command::new(expand_home(program))
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(arguments.to_string().as_bytes()).await {
                if e.kind() != io::ErrorKind::BrokenPipe {
                    return Err(spawn_err(e));
                }
                debug!(tool = name, "tool exited before reading its arguments");
            }
        }

        let output = child.wait_with_output().await.map_err(spawn_err)?;
        if !output.status.success() {
            return Err(ToolError::Failed {
                name: name.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn validate(name: &str, spec: &ToolSpec) -> Result<(), ConfigError> {
    if spec.command.is_empty() {
        return Err(ConfigError::Tool {
            name: name.to_string(),
            reason: "`command` must name a program".to_string(),
        });
    }
    if !spec.parameters.is_object() {
        return Err(ConfigError::Tool {
            name: name.to_string(),
            reason: "`parameters` must be a JSON schema object".to_string(),
        });
    }
    Ok(())
}

fn parse_arguments(name: &str, raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    let value: Value = serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    if !value.is_object() {
        return Err(ToolError::InvalidArguments {
            name: name.to_string(),
            reason: "expected a JSON object".to_string(),
        });
    }
    Ok(value)
}

/// `None` when no tool files are configured.
pub fn load_if_any(paths: &[String]) -> Result<Option<ToolRegistry>, ConfigError> {
    if paths.is_empty() {
        return Ok(None);
    }
    ToolRegistry::load(paths).map(Some)
}
