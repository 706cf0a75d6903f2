use std::error::Error;
use std::io::{self, Write};

use crate::cli::setup::{config_path, prompts_path};
use crate::cli::Args;
use crate::core::config::{ConfigFile, PromptBook};

/// Prints profiles, system prompts, or both when neither is asked for.
pub fn run_list(args: &Args, profiles: bool, system_prompts: bool) -> Result<(), Box<dyn Error>> {
    let show_all = !profiles && !system_prompts;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if profiles || show_all {
        let config = ConfigFile::load_from_path(&config_path(args))?;
        config.print_profiles(&mut out)?;
    }
    if show_all {
        writeln!(out)?;
    }
    if system_prompts || show_all {
        let prompts = PromptBook::load_from_path(&prompts_path(args))?;
        prompts.print_all(&mut out)?;
    }
    out.flush()?;
    Ok(())
}
