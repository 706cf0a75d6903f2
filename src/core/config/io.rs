use crate::core::config::data::{ConfigFile, PromptBook};
use crate::core::constants::{CONFIG_FILE_NAME, PROMPTS_FILE_NAME};
use crate::core::error::ConfigError;
use directories::ProjectDirs;
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("env var pattern is valid")
});

/// Expands `$VAR` and `${VAR}`; unset variables are left as written.
pub fn expand_env_str(value: &str) -> String {
    ENV_VAR
        .replace_all(value, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

fn expand_env(value: toml::Value) -> toml::Value {
    match value {
        toml::Value::String(s) => toml::Value::String(expand_env_str(&s)),
        toml::Value::Array(items) => toml::Value::Array(items.into_iter().map(expand_env).collect()),
        toml::Value::Table(table) => toml::Value::Table(
            table
                .into_iter()
                .map(|(key, value)| (key, expand_env(value)))
                .collect(),
        ),
        other => other,
    }
}

/// Reads a TOML file, expands environment references in every string, and
/// deserializes it. A missing file yields the type's default.
pub(crate) fn load_expanded<T: DeserializeOwned + Default>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "config file absent, using defaults");
        return Ok(T::default());
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_err = |source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let table: toml::Table = toml::from_str(&contents).map_err(parse_err)?;
    expand_env(toml::Value::Table(table))
        .try_into()
        .map_err(parse_err)
}

impl ConfigFile {
    pub fn load_from_path(path: &Path) -> Result<ConfigFile, ConfigError> {
        load_expanded(path)
    }

    pub fn default_path() -> PathBuf {
        config_dir().join(CONFIG_FILE_NAME)
    }
}

impl PromptBook {
    pub fn load_from_path(path: &Path) -> Result<PromptBook, ConfigError> {
        load_expanded(path)
    }

    pub fn default_path() -> PathBuf {
        config_dir().join(PROMPTS_FILE_NAME)
    }
}

/// `$XDG_CONFIG_HOME/quick-query` on Linux, the platform equivalent elsewhere.
pub fn config_dir() -> PathBuf {
    ProjectDirs::from("", "", "quick-query")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn expands_braced_and_bare_variables() {
        std::env::set_var("QQ_TEST_EXPAND_KEY", "secret");
        assert_eq!(expand_env_str("$QQ_TEST_EXPAND_KEY"), "secret");
        assert_eq!(expand_env_str("pre-${QQ_TEST_EXPAND_KEY}-post"), "pre-secret-post");
        assert_eq!(
            expand_env_str("$QQ_TEST_EXPAND_UNSET_VAR stays"),
            "$QQ_TEST_EXPAND_UNSET_VAR stays"
        );
        assert_eq!(expand_env_str("cost: $5"), "cost: $5");
    }

    #[test]
    fn load_nonexistent_config_returns_default() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = ConfigFile::load_from_path(&temp_dir.path().join("missing.toml"))
            .expect("Failed to load config");
        assert!(config.profile.is_empty());
        assert!(config.credentials.is_empty());
    }

    #[test]
    fn load_expands_nested_strings() {
        std::env::set_var("QQ_TEST_NESTED_HOST", "http://localhost:9000/v1");
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("conf.toml");
        fs::write(
            &path,
            r#"
[credentials.local]
host = "${QQ_TEST_NESTED_HOST}"
api_key = "none"

[profile.default]
credentials = "local"
tools = ["$QQ_TEST_NESTED_HOST/tools.toml"]
"#,
        )
        .expect("write config");

        let config = ConfigFile::load_from_path(&path).expect("load");
        assert_eq!(
            config.credentials["local"].host.as_deref(),
            Some("http://localhost:9000/v1")
        );
        let tools = config.profile["default"].tools.clone().expect("tools").into_vec();
        assert_eq!(tools, vec!["http://localhost:9000/v1/tools.toml".to_string()]);
    }

    #[test]
    fn invalid_toml_reports_path() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("broken.toml");
        fs::write(&path, "[profile.default\nmodel = ").expect("write config");

        let err = ConfigFile::load_from_path(&path).expect_err("should fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
