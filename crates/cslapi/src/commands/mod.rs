//! Command dispatch: bridges CLI args -> LAPI clients -> output formatting.

pub mod bouncer;
pub mod config_cmd;
pub mod util;
pub mod watcher;

use clap::CommandFactory;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::config;
use crate::error::CliError;

pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        // No LAPI connection needed
        Command::Config(args) => config_cmd::handle(args, global),
        Command::Completions(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "cslapi", &mut std::io::stdout());
            Ok(())
        }

        Command::Watcher(args) => {
            let resolved = config::resolve(global)?;
            watcher::handle(args, &resolved, global).await
        }
        Command::Bouncer(args) => {
            let resolved = config::resolve(global)?;
            bouncer::handle(args, &resolved, global).await
        }
    }
}
