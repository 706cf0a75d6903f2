use std::io::{self, Write};

use crate::core::config::data::{ConfigFile, PromptBook};

fn hr_rule(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "{}", "=".repeat(20))
}

impl PromptBook {
    pub fn print_all(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "Available system prompts:")?;
        for (name, entry) in &self.sections {
            let Some(prompt) = entry.prompt.as_deref() else {
                continue;
            };
            writeln!(out, "Prompt Name: {name}")?;
            hr_rule(out)?;
            writeln!(out, "Content: {prompt}")?;
            hr_rule(out)?;
            writeln!(out)?;
        }
        Ok(())
    }
}

impl ConfigFile {
    /// Lists every profile with its resolved credentials; the api key is
    /// always redacted.
    pub fn print_profiles(&self, out: &mut dyn Write) -> io::Result<()> {
        for (name, entry) in &self.profile {
            writeln!(out, "Profile: {name}")?;
            if let Some(model) = &entry.model {
                writeln!(out, " -model: {model}")?;
            }
            if let Some(prompt) = &entry.prompt {
                writeln!(out, " -prompt_name: {prompt}")?;
            }
            if let Some(structured) = entry.structured_streaming {
                writeln!(out, " -structured_streaming: {structured}")?;
            }
            if let Some(tag) = &entry.cot_token {
                writeln!(out, " -cot_token: {tag}")?;
            }
            if let Some(size) = entry.min_chunk_size {
                writeln!(out, " -min_chunk_size: {size}")?;
            }
            if let Some(rethink) = entry.rethink {
                writeln!(out, " -rethink: {rethink}")?;
            }
            if let Some(tools) = &entry.tools {
                writeln!(out, " -tools: {:?}", tools.clone().into_vec())?;
            }
            if !entry.parameters.is_empty() {
                let parameters = serde_json::Value::Object(entry.parameters.clone());
                writeln!(out, " -parameters: {parameters}")?;
            }

            let credentials = entry
                .credentials
                .as_deref()
                .and_then(|key| self.credentials.get(key));
            match (entry.credentials.as_deref(), credentials) {
                (Some(_), Some(creds)) => {
                    if let Some(host) = &creds.host {
                        writeln!(out, " -host: {host}")?;
                    }
                    if creds.api_key.is_some() {
                        writeln!(out, " -api_key: ***")?;
                    }
                    for (key, value) in &creds.extra {
                        writeln!(out, " -{key}: {value}")?;
                    }
                }
                (Some(key), None) => writeln!(out, " -credentials: {key} (not found)")?,
                (None, _) => {}
            }

            for (key, value) in &entry.extra {
                writeln!(out, " -{key}: {value}")?;
            }

            hr_rule(out)?;
            writeln!(out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_listing_redacts_api_key() {
        let table: toml::Table = toml::from_str(
            r#"
[credentials.remote]
host = "https://api.example.com/v1"
api_key = "sk-very-secret"
org = "acme"

[profile.default]
credentials = "remote"
model = "gpt"
note = "hello"
"#,
        )
        .expect("parse");
        let config: ConfigFile = toml::Value::Table(table).try_into().expect("deserialize");

        let mut out: Vec<u8> = Vec::new();
        config.print_profiles(&mut out).expect("print");
        let text = String::from_utf8(out).expect("utf8");

        assert!(text.contains("Profile: default"));
        assert!(text.contains(" -model: gpt"));
        assert!(text.contains(" -host: https://api.example.com/v1"));
        assert!(text.contains(" -api_key: ***"));
        assert!(text.contains(" -org: \"acme\""));
        assert!(text.contains(" -note: \"hello\""));
        assert!(!text.contains("sk-very-secret"));
    }

    #[test]
    fn prompt_listing_shows_each_section() {
        let book: PromptBook = toml::from_str(
            r#"
[default]
prompt = "Be helpful."
"#,
        )
        .expect("parse");
        let mut out: Vec<u8> = Vec::new();
        book.print_all(&mut out).expect("print");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("Available system prompts:\n"));
        assert!(text.contains("Prompt Name: default"));
        assert!(text.contains("Content: Be helpful."));
    }
}
