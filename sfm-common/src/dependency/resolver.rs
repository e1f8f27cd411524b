//! Recursive discovery of a root formula's full dependency set.
//!
//! Starting from the root manifest (or a pinned requirements set), each
//! dependency's own pinned requirements file is fetched when available,
//! falling back to its manifest; discovered constraints are merged into a
//! single record per formula and the walk recurses into whatever was newly
//! merged. A constraint string is fetched at most once per run, which both
//! bounds the remote traffic and terminates cycles.

use std::collections::BTreeMap;

use async_recursion::async_recursion;
use tracing::{debug, warn};

use crate::config::{METADATA_FILENAME, REQUIREMENTS_FILENAME};
use crate::dependency::constraint::resolve_constraints;
use crate::dependency::select::resolve_constraint_to_ref;
use crate::error::{Result, SfmError};
use crate::manifest::Manifest;
use crate::model::{FormulaDependency, FormulaKey};
use crate::remote::RemoteRepository;
use crate::requirements;

pub struct DependencyResolver {
    root: Option<FormulaKey>,
    root_dependencies: BTreeMap<FormulaKey, FormulaDependency>,
    local_requirements: BTreeMap<FormulaKey, FormulaDependency>,
    dependencies: BTreeMap<FormulaKey, FormulaDependency>,
}

impl DependencyResolver {
    pub fn new(manifest: &Manifest, local_requirements: Option<Vec<FormulaDependency>>) -> Self {
        let local_requirements = local_requirements
            .unwrap_or_default()
            .into_iter()
            .map(|dep| (dep.key.clone(), dep))
            .collect();
        Self {
            root: manifest.formula.clone(),
            root_dependencies: manifest.dependencies.clone(),
            local_requirements,
            dependencies: BTreeMap::new(),
        }
    }

    /// Resolver over an already-flat dependency set (a pinned lockfile),
    /// with no root manifest and no graph walking to do.
    pub fn from_dependencies(dependencies: Vec<FormulaDependency>) -> Self {
        Self {
            root: None,
            root_dependencies: BTreeMap::new(),
            local_requirements: BTreeMap::new(),
            dependencies: dependencies
                .into_iter()
                .map(|dep| (dep.key.clone(), dep))
                .collect(),
        }
    }

    pub fn root(&self) -> Option<&FormulaKey> {
        self.root.as_ref()
    }

    /// The resolved dependency set accumulated by the last
    /// [`update_dependencies`](Self::update_dependencies) run.
    pub fn dependencies(&self) -> &BTreeMap<FormulaKey, FormulaDependency> {
        &self.dependencies
    }

    /// `org/name==version` lines for the resolved set, suitable for the
    /// requirements lockfile.
    pub fn requirement_lines(&self) -> Vec<String> {
        self.dependencies
            .values()
            .filter_map(FormulaDependency::requirement_line)
            .collect()
    }

    /// Walk the dependency graph from the root down, rebuilding the
    /// dependency set from scratch.
    ///
    /// When a pinned requirements set was supplied and
    /// `ignore_local_requirements` is unset, the walk is seeded from it
    /// instead of the root manifest's declared dependencies.
    /// `ignore_dependency_requirements` skips each dependency's own pinned
    /// requirements file and derives everything from manifests.
    pub async fn update_dependencies(
        &mut self,
        remote: &dyn RemoteRepository,
        ignore_local_requirements: bool,
        ignore_dependency_requirements: bool,
    ) -> Result<()> {
        self.dependencies.clear();

        let seed: Vec<FormulaDependency> =
            if !ignore_local_requirements && !self.local_requirements.is_empty() {
                debug!("Updating dependencies from pinned requirements");
                self.local_requirements.values().cloned().collect()
            } else {
                debug!("Updating dependencies from metadata");
                if self.root_dependencies.is_empty() {
                    debug!("No dependencies found in metadata");
                    return Ok(());
                }
                self.root_dependencies.values().cloned().collect()
            };

        // The root never becomes an entry in its own dependency map.
        let seed: Vec<FormulaDependency> = seed
            .into_iter()
            .filter(|dep| !self.is_root(&dep.key))
            .collect();
        for dep in &seed {
            self.dependencies.insert(dep.key.clone(), dep.clone());
        }

        self.fetch_dependencies(remote, seed, ignore_dependency_requirements)
            .await
    }

    /// Finalize every record with the concrete revision its merged
    /// constraint selects. Records whose repository offers no suitable
    /// revision at all are left unresolved for the materializer to report.
    pub async fn resolve_revisions(&mut self, remote: &dyn RemoteRepository) -> Result<()> {
        debug!(
            "Resolving revisions for dependencies: {:?}",
            self.dependencies.keys().map(|k| k.to_string()).collect::<Vec<_>>()
        );
        let keys: Vec<FormulaKey> = self.dependencies.keys().cloned().collect();
        for key in keys {
            let constraint = self.dependencies[&key].constraint.clone();
            match resolve_constraint_to_ref(remote, &key.organisation, &key.name, &constraint)
                .await?
            {
                Some(resolved) => {
                    debug!(
                        "Found version '{}' and sha '{}' for {key}",
                        resolved.name, resolved.sha
                    );
                    if let Some(record) = self.dependencies.get_mut(&key) {
                        record.resolved_tag = Some(resolved.name);
                        record.resolved_sha = Some(resolved.sha);
                    }
                }
                None => warn!("No suitable revision found for {key}"),
            }
        }
        Ok(())
    }

    fn is_root(&self, key: &FormulaKey) -> bool {
        self.root.as_ref() == Some(key)
    }

    #[async_recursion]
    async fn fetch_dependencies(
        &mut self,
        remote: &dyn RemoteRepository,
        base: Vec<FormulaDependency>,
        ignore_dependency_requirements: bool,
    ) -> Result<()> {
        for dep in base {
            let constraint_string = dep.constraint.to_string();
            debug!("Processing '{}'", dep.key);

            if self.is_root(&dep.key) {
                debug!("Root key dependency found {}, skipping", dep.key);
                continue;
            }
            if let Some(existing) = self.dependencies.get(&dep.key) {
                if existing.sourced_constraints.contains(&constraint_string) {
                    debug!(
                        "Already have constraint '{}' in sourced constraints {:?}",
                        constraint_string, existing.sourced_constraints
                    );
                    continue;
                }
            }

            let mut found = None;
            if !ignore_dependency_requirements {
                found = self.fetch_remote_requirements(remote, &dep).await?;
            }
            if found.is_none() {
                found = self.fetch_remote_metadata(remote, &dep).await?;
            }

            // Every sourcing method has been tried by now; never retry this
            // constraint in the same run, found or not.
            self.mark_sourced(&dep, &constraint_string);

            match found {
                Some(discovered) => {
                    let merged = self.add_dependencies_from_metadata(discovered)?;
                    self.fetch_dependencies(remote, merged, ignore_dependency_requirements)
                        .await?;
                }
                None => {
                    debug!(
                        "No requirements or metadata found for {}, treating as a leaf",
                        dep.key
                    );
                }
            }
        }
        Ok(())
    }

    /// Merge a freshly discovered dependency list into the global set,
    /// returning the entries worth recursing into (everything except the
    /// root itself).
    fn add_dependencies_from_metadata(
        &mut self,
        discovered: Vec<FormulaDependency>,
    ) -> Result<Vec<FormulaDependency>> {
        let mut merged = Vec::new();
        for dep in discovered {
            if self.is_root(&dep.key) {
                debug!("Root key found ({}), ignoring", dep.key);
                continue;
            }
            match self.dependencies.get_mut(&dep.key) {
                None => {
                    debug!("New dependency added '{}'", dep.key);
                    self.dependencies.insert(dep.key.clone(), dep.clone());
                }
                Some(existing) => {
                    existing.constraint = resolve_constraints(&dep.constraint, &existing.constraint)?;
                    debug!(
                        "Updated constraint for '{}' to '{}'",
                        dep.key, existing.constraint
                    );
                    existing
                        .sourced_constraints
                        .extend(dep.sourced_constraints.iter().cloned());
                }
            }
            merged.push(dep);
        }
        Ok(merged)
    }

    fn mark_sourced(&mut self, dep: &FormulaDependency, constraint_string: &str) {
        let entry = self
            .dependencies
            .entry(dep.key.clone())
            .or_insert_with(|| dep.clone());
        if !entry
            .sourced_constraints
            .iter()
            .any(|sourced| sourced == constraint_string)
        {
            entry.sourced_constraints.push(constraint_string.to_string());
        }
    }

    async fn fetch_remote_requirements(
        &self,
        remote: &dyn RemoteRepository,
        dep: &FormulaDependency,
    ) -> Result<Option<Vec<FormulaDependency>>> {
        debug!("Looking for requirements for {}:{}", dep.key, dep.constraint);
        let Some(text) = self
            .fetch_remote_file(remote, dep, REQUIREMENTS_FILENAME)
            .await?
        else {
            debug!("No requirements found for {}", dep.key);
            return Ok(None);
        };

        let mut entries = requirements::parse(&text)?;
        if entries.is_empty() {
            return Err(SfmError::Config(format!(
                "Could not parse requirements found for {}",
                dep.key
            )));
        }
        for entry in &mut entries {
            // A fetched requirements file is already a flat, fully pinned
            // closure; mark its entries sourced so they are not re-fetched.
            entry.sourced_constraints = vec![entry.constraint.to_string()];
        }
        Ok(Some(entries))
    }

    async fn fetch_remote_metadata(
        &self,
        remote: &dyn RemoteRepository,
        dep: &FormulaDependency,
    ) -> Result<Option<Vec<FormulaDependency>>> {
        debug!("Looking for metadata for {}", dep.key);
        let Some(text) = self
            .fetch_remote_file(remote, dep, METADATA_FILENAME)
            .await?
        else {
            debug!("No metadata found for {}:{}", dep.key, dep.constraint);
            return Ok(None);
        };
        let manifest = Manifest::parse(&text)?;
        Ok(Some(manifest.dependencies.into_values().collect()))
    }

    async fn fetch_remote_file(
        &self,
        remote: &dyn RemoteRepository,
        dep: &FormulaDependency,
        path: &str,
    ) -> Result<Option<String>> {
        let target = resolve_constraint_to_ref(
            remote,
            &dep.key.organisation,
            &dep.key.name,
            &dep.constraint,
        )
        .await?;
        let Some(target) = target else {
            return Err(SfmError::RemoteConnection(format!(
                "{}:{}: no target object found, check the repository exists and that \
                 the GITHUB_TOKEN environment variable is set for authenticated \
                 access to private repositories",
                dep.key, dep.constraint
            )));
        };
        remote
            .fetch_file(&dep.key.organisation, &dep.key.name, &target.name, path)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::testing::MockRemote;

    const ORG: &str = "test_organisation";

    fn key(name: &str) -> FormulaKey {
        FormulaKey::new(ORG, name)
    }

    fn manifest(root: &str, entries: &[&str]) -> Manifest {
        let mut text = format!("formula: {ORG}/{root}\ndependencies:\n");
        for entry in entries {
            text.push_str(&format!("  - {ORG}/{entry}\n"));
        }
        Manifest::parse(&text).unwrap()
    }

    fn metadata_file(root: &str, entries: &[&str]) -> String {
        let mut text = format!("formula: {ORG}/{root}\ndependencies:\n");
        for entry in entries {
            text.push_str(&format!("  - git@github.com:{ORG}/{entry}\n"));
        }
        text
    }

    #[tokio::test]
    async fn root_self_cycle_terminates() {
        let remote = MockRemote::new()
            .with_tags(ORG, "b-formula", &[("v1.0.1", "sha-b")])
            .with_file(
                ORG,
                "b-formula",
                "metadata.yml",
                &metadata_file("b-formula", &["a-formula.git==v1.0.1"]),
            );

        let mut resolver =
            DependencyResolver::new(&manifest("a-formula", &["b-formula==v1.0.1"]), None);
        resolver.update_dependencies(&remote, true, false).await.unwrap();

        assert!(resolver.dependencies().contains_key(&key("b-formula")));
        // The root must never appear in its own dependency map.
        assert!(!resolver.dependencies().contains_key(&key("a-formula")));
    }

    #[tokio::test]
    async fn mutual_cycle_terminates_and_fetches_once() {
        let remote = MockRemote::new()
            .with_tags(ORG, "b-formula", &[("v1.0.1", "sha-b")])
            .with_tags(ORG, "c-formula", &[("v1.0.1", "sha-c")])
            .with_file(
                ORG,
                "b-formula",
                "metadata.yml",
                &metadata_file("b-formula", &["c-formula.git==v1.0.1"]),
            )
            .with_file(
                ORG,
                "c-formula",
                "metadata.yml",
                &metadata_file("c-formula", &["b-formula.git==v1.0.1"]),
            );

        let mut resolver =
            DependencyResolver::new(&manifest("a-formula", &["b-formula==v1.0.1"]), None);
        resolver.update_dependencies(&remote, true, false).await.unwrap();

        assert!(resolver.dependencies().contains_key(&key("b-formula")));
        assert!(resolver.dependencies().contains_key(&key("c-formula")));
        assert_eq!(
            remote.call_count(&format!("file {ORG}/b-formula/metadata.yml")),
            1
        );
        assert_eq!(
            remote.call_count(&format!("file {ORG}/c-formula/metadata.yml")),
            1
        );
    }

    #[tokio::test]
    async fn shared_dependency_is_fetched_once() {
        let remote = MockRemote::new()
            .with_tags(ORG, "b-formula", &[("v1.0.1", "sha-b")])
            .with_tags(ORG, "c-formula", &[("v1.0.1", "sha-c")])
            .with_tags(ORG, "d-formula", &[("v1.0.0", "sha-d")])
            .with_file(
                ORG,
                "b-formula",
                "metadata.yml",
                &metadata_file("b-formula", &["d-formula.git==v1.0.0"]),
            )
            .with_file(
                ORG,
                "c-formula",
                "metadata.yml",
                &metadata_file("c-formula", &["d-formula.git==v1.0.0"]),
            );

        let mut resolver = DependencyResolver::new(
            &manifest("a-formula", &["b-formula==v1.0.1", "c-formula==v1.0.1"]),
            None,
        );
        resolver.update_dependencies(&remote, true, false).await.unwrap();

        assert!(resolver.dependencies().contains_key(&key("d-formula")));
        assert_eq!(
            remote.call_count(&format!("file {ORG}/d-formula/metadata.yml")),
            1
        );
        assert_eq!(
            remote.call_count(&format!("file {ORG}/d-formula/formula-requirements.txt")),
            1
        );
    }

    #[tokio::test]
    async fn constraints_merge_across_paths() {
        let remote = MockRemote::new()
            .with_tags(ORG, "b-formula", &[("v1.0.1", "sha-b")])
            .with_tags(ORG, "c-formula", &[("v1.0.1", "sha-c")])
            .with_tags(ORG, "d-formula", &[("v1.0.0", "sha-d1"), ("v2.0.1", "sha-d2")])
            .with_file(
                ORG,
                "b-formula",
                "metadata.yml",
                &metadata_file("b-formula", &["d-formula.git>=v1.0.0"]),
            )
            .with_file(
                ORG,
                "c-formula",
                "metadata.yml",
                &metadata_file("c-formula", &["d-formula.git==v2.0.1"]),
            );

        let mut resolver = DependencyResolver::new(
            &manifest("a-formula", &["b-formula==v1.0.1", "c-formula==v1.0.1"]),
            None,
        );
        resolver.update_dependencies(&remote, true, false).await.unwrap();

        let record = &resolver.dependencies()[&key("d-formula")];
        assert_eq!(record.constraint.to_string(), "==v2.0.1");
        assert!(record
            .sourced_constraints
            .contains(&">=v1.0.0".to_string()));
        assert!(record
            .sourced_constraints
            .contains(&"==v2.0.1".to_string()));
    }

    #[tokio::test]
    async fn fetched_requirements_are_a_flat_closure() {
        let remote = MockRemote::new()
            .with_tags(ORG, "b-formula", &[("v1.0.1", "sha-b")])
            .with_file(
                ORG,
                "b-formula",
                "formula-requirements.txt",
                &format!("git@github.com:{ORG}/d-formula.git==v1.0.0\n"),
            );

        let mut resolver =
            DependencyResolver::new(&manifest("a-formula", &["b-formula==v1.0.1"]), None);
        resolver.update_dependencies(&remote, true, false).await.unwrap();

        let record = &resolver.dependencies()[&key("d-formula")];
        assert_eq!(record.constraint.to_string(), "==v1.0.0");
        assert_eq!(record.sourced_constraints, vec!["==v1.0.0".to_string()]);
        // Entries of a pinned requirements file are never re-fetched.
        assert_eq!(remote.call_count(&format!("tags {ORG}/d-formula")), 0);
        assert_eq!(
            remote.call_count(&format!("file {ORG}/d-formula/metadata.yml")),
            0
        );
    }

    #[tokio::test]
    async fn local_requirements_seed_the_walk_unless_ignored() {
        let remote = MockRemote::new()
            .with_tags(ORG, "b-formula", &[("v1.0.1", "sha-b")])
            .with_tags(ORG, "c-formula", &[("v2.0.1", "sha-c")]);

        let pinned = requirements::parse(&format!(
            "git@github.com:{ORG}/c-formula.git==v2.0.1\n"
        ))
        .unwrap();
        let mut resolver = DependencyResolver::new(
            &manifest("a-formula", &["b-formula==v1.0.1"]),
            Some(pinned),
        );

        resolver.update_dependencies(&remote, false, false).await.unwrap();
        assert!(resolver.dependencies().contains_key(&key("c-formula")));
        assert!(!resolver.dependencies().contains_key(&key("b-formula")));

        resolver.update_dependencies(&remote, true, false).await.unwrap();
        assert!(resolver.dependencies().contains_key(&key("b-formula")));
        assert!(!resolver.dependencies().contains_key(&key("c-formula")));
    }

    #[tokio::test]
    async fn unsatisfiable_constraint_aborts_the_run() {
        let remote = MockRemote::new().with_tags(ORG, "b-formula", &[("v1.0.1", "sha-b")]);

        let mut resolver =
            DependencyResolver::new(&manifest("a-formula", &["b-formula==v6.6.6"]), None);
        let err = resolver
            .update_dependencies(&remote, true, false)
            .await
            .unwrap_err();
        assert!(matches!(err, SfmError::ConstraintResolution(_)));
    }

    #[tokio::test]
    async fn tagless_unconstrained_dependency_is_fatal() {
        let remote = MockRemote::new();

        let mut resolver = DependencyResolver::new(&manifest("a-formula", &["b-formula"]), None);
        let err = resolver
            .update_dependencies(&remote, true, false)
            .await
            .unwrap_err();
        assert!(matches!(err, SfmError::RemoteConnection(_)));
    }

    #[tokio::test]
    async fn resolve_revisions_pins_shas_and_tags() {
        let remote = MockRemote::new()
            .with_tags(ORG, "b-formula", &[("v1.0.1", "sha-b")])
            .with_tags(ORG, "c-formula", &[("v1.0.1", "old-c"), ("v2.0.1", "sha-c")]);

        let mut resolver = DependencyResolver::new(
            &manifest("a-formula", &["b-formula==v1.0.1", "c-formula"]),
            None,
        );
        resolver.update_dependencies(&remote, true, false).await.unwrap();
        resolver.resolve_revisions(&remote).await.unwrap();

        let b = &resolver.dependencies()[&key("b-formula")];
        assert_eq!(b.resolved_tag.as_deref(), Some("v1.0.1"));
        assert_eq!(b.resolved_sha.as_deref(), Some("sha-b"));

        let c = &resolver.dependencies()[&key("c-formula")];
        assert_eq!(c.resolved_tag.as_deref(), Some("v2.0.1"));
        assert_eq!(c.resolved_sha.as_deref(), Some("sha-c"));

        assert_eq!(
            resolver.requirement_lines(),
            vec![
                format!("{ORG}/b-formula==v1.0.1"),
                format!("{ORG}/c-formula==v2.0.1"),
            ]
        );
    }

    #[tokio::test]
    async fn repeated_resolution_is_idempotent() {
        let remote = MockRemote::new()
            .with_tags(ORG, "b-formula", &[("v1.0.1", "sha-b")])
            .with_tags(ORG, "d-formula", &[("v1.0.0", "sha-d")])
            .with_file(
                ORG,
                "b-formula",
                "metadata.yml",
                &metadata_file("b-formula", &["d-formula.git==v1.0.0"]),
            );

        let mut resolver =
            DependencyResolver::new(&manifest("a-formula", &["b-formula==v1.0.1"]), None);
        resolver.update_dependencies(&remote, true, false).await.unwrap();
        let first = resolver.dependencies().clone();

        resolver.update_dependencies(&remote, true, false).await.unwrap();
        assert_eq!(resolver.dependencies(), &first);
    }
}
