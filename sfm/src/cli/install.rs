use clap::Args;
use colored::Colorize;
use tracing::{info, warn};

use sfm_common::dependency::DependencyResolver;
use sfm_common::error::{Result, SfmError};
use sfm_common::{requirements, Config};
use sfm_core::Workspace;
use sfm_net::GithubClient;

#[derive(Args, Debug)]
pub struct Install {
    /// Only print the requirements that would be installed, change nothing
    #[arg(long)]
    pub simulate: bool,

    /// Contact the remote to recalculate revision shas for the pinned tags
    #[arg(long)]
    pub remote_check: bool,
}

impl Install {
    pub async fn run(&self, config: &Config) -> Result<()> {
        info!("Installing pinned requirements, dependencies will be installed from the stored formula requirements");
        let pinned = requirements::load(&config.requirements_path())?.ok_or_else(|| {
            SfmError::Config(format!(
                "No pinned requirements found at '{}', run 'sfm update' first",
                config.requirements_path().display()
            ))
        })?;

        let mut resolver = DependencyResolver::from_dependencies(pinned);
        if self.remote_check {
            let client = GithubClient::new(config)?;
            resolver.resolve_revisions(&client).await?;
        }

        if self.simulate {
            warn!("Simulation mode enabled, no changes will be made...");
            for line in resolver.requirement_lines() {
                println!("{line}");
            }
            return Ok(());
        }

        let workspace = Workspace::new(config);
        let outcome = workspace.install_dependencies(
            resolver.dependencies(),
            !self.remote_check,
            false,
            true,
        )?;
        if outcome.failed > 0 {
            return Err(SfmError::RequirementsUpdate(format!(
                "{} successful, {} failed",
                outcome.successful, outcome.failed
            )));
        }

        if self.remote_check {
            info!("Writing requirements file...");
            requirements::write(
                &config.requirements_path(),
                &resolver.requirement_lines(),
                true,
                false,
            )?;
        }
        println!(
            "{} {} formulas installed",
            "==>".bold().blue(),
            outcome.successful
        );
        Ok(())
    }
}
