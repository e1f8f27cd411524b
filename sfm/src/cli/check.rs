use clap::Args;
use colored::Colorize;
use tracing::info;

use sfm_common::dependency::DependencyResolver;
use sfm_common::error::Result;
use sfm_common::{requirements, Config, Manifest};
use sfm_net::GithubClient;

#[derive(Args, Debug)]
pub struct Check {}

impl Check {
    pub async fn run(&self, config: &Config) -> Result<()> {
        info!("Checking the current requirements against an update");
        let client = GithubClient::new(config)?;

        let pinned = requirements::load(&config.requirements_path())?.unwrap_or_default();
        let mut current = DependencyResolver::from_dependencies(pinned);
        current.resolve_revisions(&client).await?;
        let current_lines = current.requirement_lines();

        let manifest = Manifest::load(&config.metadata_path())?;
        let mut fresh = DependencyResolver::new(&manifest, None);
        fresh.update_dependencies(&client, true, false).await?;
        fresh.resolve_revisions(&client).await?;
        let new_lines = fresh.requirement_lines();

        let diff = requirements::compare(&current_lines, &new_lines);
        if diff.is_empty() {
            println!("No formula requirements changes found");
            return Ok(());
        }
        for (current_entry, new_entry) in &diff {
            match (current_entry, new_entry) {
                (None, Some(new)) => println!("{} New entry {new}", "+".green()),
                (Some(old), None) => println!("{} Deprecated entry {old}", "-".red()),
                (Some(old), Some(new)) => println!("{} {old} != {new}", "~".yellow()),
                (None, None) => {}
            }
        }
        Ok(())
    }
}
