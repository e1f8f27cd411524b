use clap::Args;
use colored::Colorize;
use tracing::{info, warn};

use sfm_common::dependency::DependencyResolver;
use sfm_common::error::{Result, SfmError};
use sfm_common::{requirements, Config, Manifest};
use sfm_core::Workspace;
use sfm_net::GithubClient;

#[derive(Args, Debug)]
pub struct Update {
    /// Only print the requirements that would be installed, change nothing
    #[arg(long)]
    pub simulate: bool,
}

impl Update {
    pub async fn run(&self, config: &Config) -> Result<()> {
        info!("Updating and installing requirements, all dependencies will be re-calculated from the metadata");
        let manifest = Manifest::load(&config.metadata_path())?;
        let client = GithubClient::new(config)?;

        let mut resolver = DependencyResolver::new(&manifest, None);
        resolver.update_dependencies(&client, true, false).await?;
        resolver.resolve_revisions(&client).await?;

        if self.simulate {
            warn!("Simulation mode enabled, no changes will be made...");
            for line in resolver.requirement_lines() {
                println!("{line}");
            }
            return Ok(());
        }

        let workspace = Workspace::new(config);
        let outcome = workspace.install_dependencies(resolver.dependencies(), false, true, true)?;
        if outcome.failed > 0 {
            return Err(SfmError::RequirementsUpdate(format!(
                "{} successful, {} failed",
                outcome.successful, outcome.failed
            )));
        }

        info!("Writing requirements file...");
        requirements::write(
            &config.requirements_path(),
            &resolver.requirement_lines(),
            true,
            false,
        )?;
        println!(
            "{} {} formulas installed",
            "==>".bold().blue(),
            outcome.successful
        );
        Ok(())
    }
}
