// sfm/src/cli.rs
pub mod check;
pub mod install;
pub mod update;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use sfm_common::error::Result;
use sfm_common::Config;

#[derive(Parser, Debug)]
#[command(
    name = "sfm",
    version,
    about = "Resolve a formula dependency graph into pinned revisions and install them"
)]
pub struct CliArgs {
    /// Working path to operate under
    #[arg(long, global = true, default_value = ".")]
    pub root_dir: PathBuf,

    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Recalculate all dependencies from metadata, install them and rewrite
    /// the pinned requirements
    Update(update::Update),
    /// Install the pinned requirements as they stand
    Install(install::Install),
    /// Compare the pinned requirements against a fresh resolution
    Check(check::Check),
}

impl CliArgs {
    pub async fn run(&self) -> Result<()> {
        let config = Config::load(self.root_dir.clone())?;
        match &self.command {
            Command::Update(cmd) => cmd.run(&config).await,
            Command::Install(cmd) => cmd.run(&config).await,
            Command::Check(cmd) => cmd.run(&config).await,
        }
    }
}
