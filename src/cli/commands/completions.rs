//! Shell completion scripts
//!
//! Writes a completion script for the requested shell to stdout:
//!
//! ```bash
//! source <(taskdesk completions bash)          # bash, in ~/.bashrc
//! taskdesk completions fish > ~/.config/fish/completions/taskdesk.fish
//! ```

use clap::CommandFactory;
use clap_complete::{generate, Shell};
use miette::Result;
use std::io;

use crate::cli::Cli;

#[derive(clap::Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

pub fn run(args: CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(args.shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}
