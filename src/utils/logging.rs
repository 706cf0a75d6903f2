//! Diagnostic logging setup.
//!
//! Stdout carries model output and JSONL records, so diagnostics always go to
//! stderr or, with `--log-file`, to a file.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::core::constants::LOG_ENV_VAR;

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "qq=debug,warn"
    } else {
        "warn"
    }
}

/// `QQ_LOG` wins when set and valid; otherwise `--verbose` picks the level.
pub fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

pub fn init_tracing(
    verbose: bool,
    log_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbose))
        .with_target(false);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()?;
        }
        None => builder.with_writer(io::stderr).try_init()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_only_this_crate() {
        assert_eq!(default_directive(false), "warn");
        assert_eq!(default_directive(true), "qq=debug,warn");
    }

    #[test]
    fn default_filter_parses() {
        let filter = EnvFilter::new(default_directive(true));
        assert!(filter.to_string().contains("qq=debug"));
    }

    #[test]
    fn unopenable_log_file_is_reported() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("missing").join("qq.log");
        let err = init_tracing(false, Some(&path)).expect_err("no parent directory");
        assert!(err.downcast_ref::<io::Error>().is_some());
    }
}
