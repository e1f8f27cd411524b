//! Materialization of a resolved dependency set into the local vendor
//! workspace: checkouts under the repository directory, orphan collection,
//! and symlinks into the salt root.

mod git;
mod link;

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, error, info};

use sfm_common::config::Config;
use sfm_common::error::{Result, SfmError};
use sfm_common::model::{FormulaDependency, FormulaKey};

#[derive(Debug, Default, Clone, Copy)]
pub struct InstallOutcome {
    pub successful: usize,
    pub failed: usize,
}

pub struct Workspace {
    vendor_dir: PathBuf,
    repos_dir: PathBuf,
    salt_root_dir: PathBuf,
    github_token: Option<String>,
}

impl Workspace {
    pub fn new(config: &Config) -> Self {
        Self {
            vendor_dir: config.vendor_dir(),
            repos_dir: config.repos_dir(),
            salt_root_dir: config.salt_root_dir(),
            github_token: config.github_token.clone(),
        }
    }

    /// Set up the vendor layout. The salt root holds only symlinks and is
    /// recreated from scratch; the repository directory is wiped only when
    /// `overwrite` is set.
    pub fn create_directories(&self, overwrite: bool) -> Result<()> {
        if !self.vendor_dir.exists() {
            fs::create_dir_all(&self.vendor_dir)?;
        }

        if self.salt_root_dir.exists() {
            debug!(
                "Deleting salt root directory '{}'",
                self.salt_root_dir.display()
            );
            fs::remove_dir_all(&self.salt_root_dir)?;
        }
        fs::create_dir_all(&self.salt_root_dir)?;

        if self.repos_dir.exists() && overwrite {
            debug!(
                "Deleting repository directory '{}'",
                self.repos_dir.display()
            );
            fs::remove_dir_all(&self.repos_dir)?;
        }
        if !self.repos_dir.exists() {
            debug!(
                "Creating repository directory '{}'",
                self.repos_dir.display()
            );
            fs::create_dir_all(&self.repos_dir)?;
        }
        Ok(())
    }

    /// Check out every resolved dependency and relink the salt root,
    /// returning how many checkouts succeeded and failed.
    ///
    /// With `use_tag` set the pinned constraint tag is resolved locally in
    /// each repository (no remote API checks); otherwise the records'
    /// resolved SHAs are checked out. Orphaned directories, present on disk
    /// but absent from the dependency set, are deleted unless
    /// `remove_orphans` is unset.
    pub fn install_dependencies(
        &self,
        dependencies: &BTreeMap<FormulaKey, FormulaDependency>,
        use_tag: bool,
        overwrite: bool,
        remove_orphans: bool,
    ) -> Result<InstallOutcome> {
        self.create_directories(overwrite)?;

        let mut outcome = InstallOutcome::default();
        for dep in dependencies.values() {
            match self.install_one(dep, use_tag) {
                Ok(revision) => {
                    info!("Updating '{}' from {revision}...OK", dep.key.name);
                    outcome.successful += 1;
                }
                Err(e) => {
                    error!("Updating '{}'...FAIL: {e}", dep.key.name);
                    outcome.failed += 1;
                }
            }
        }

        if remove_orphans {
            self.remove_orphaned(dependencies)?;
        }

        link::update_root_links(&self.repos_dir, &self.salt_root_dir, dependencies)?;
        Ok(outcome)
    }

    fn install_one(&self, dep: &FormulaDependency, use_tag: bool) -> Result<String> {
        let name = &dep.key.name;
        let target_path = self.repos_dir.join(name);
        debug!(
            "Opening {name} in directory {}, with url {}, sha {:?}, tag {:?}",
            self.repos_dir.display(),
            dep.source,
            dep.resolved_sha,
            dep.resolved_tag
        );
        let repo = git::open_or_clone(&dep.source, &target_path, self.github_token.as_deref())?;

        let (sha, revision) = if use_tag {
            let tag = if !dep.constraint.tag.is_empty() {
                dep.constraint.tag.as_str()
            } else {
                return Err(SfmError::ConstraintResolution(
                    "No tag found when remote checks disabled".to_string(),
                ));
            };
            let sha = git::revision_sha(&repo, tag)?.ok_or_else(|| {
                SfmError::Install(format!("Could not find tag or branch '{tag}'"))
            })?;
            (sha, format!("tag '{tag}'"))
        } else {
            let sha = dep.resolved_sha.clone().ok_or_else(|| {
                SfmError::Install(format!("No resolved sha for '{name}'"))
            })?;
            (sha.clone(), format!("raw sha '{sha}'"))
        };

        // Skip the checkout when the working tree is already there.
        if git::head_sha(&target_path).as_deref() == Some(sha.as_str()) {
            debug!("{name}: target and current shas are equivalent, skipping update");
            return Ok(revision);
        }

        git::checkout_revision(&repo, &sha, self.github_token.as_deref())?;
        debug!("Source '{name}' is at version '{sha}'");
        Ok(revision)
    }

    /// Delete previously materialized directories that no longer correspond
    /// to any resolved dependency.
    fn remove_orphaned(
        &self,
        dependencies: &BTreeMap<FormulaKey, FormulaDependency>,
    ) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for entry in fs::read_dir(&self.repos_dir)? {
            let entry = entry?;
            let dir_name = entry.file_name().to_string_lossy().to_string();
            let known = dependencies.values().any(|dep| dep.key.name == dir_name);
            if !known {
                debug!("Deleting directory of non-existent dependency '{dir_name}'");
                fs::remove_dir_all(entry.path())?;
                removed.push(dir_name);
            }
        }
        Ok(removed)
    }
}
