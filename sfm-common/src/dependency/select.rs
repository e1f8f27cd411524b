//! Selection of the single concrete revision that best satisfies a
//! constraint against a repository's available tags and branches.

use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::error::{Result, SfmError};
use crate::model::version::{compare_versions, latest_tag, Comparator, SemverTag, VersionConstraint};
use crate::remote::{RemoteRepository, ResolvedRef, TagRef};

struct Candidate<'a> {
    order: SemverTag,
    version: String,
    tag: &'a TagRef,
}

impl Candidate<'_> {
    fn resolved(&self) -> ResolvedRef {
        ResolvedRef {
            name: self.tag.name.clone(),
            sha: self.tag.sha.clone(),
        }
    }
}

/// Resolve `constraint` for `organisation/name` to a concrete revision.
///
/// A constrained tag that is not version-shaped is treated as a branch name
/// and looked up directly. Otherwise the repository's versioned tags are
/// ordered semantically and scanned per the constraint's comparator;
/// prereleases never satisfy an inequality. `Ok(None)` is only returned for
/// the unconstrained case when the repository has no release tag at all.
pub async fn resolve_constraint_to_ref(
    remote: &dyn RemoteRepository,
    organisation: &str,
    name: &str,
    constraint: &VersionConstraint,
) -> Result<Option<ResolvedRef>> {
    debug!("resolve_constraint_to_ref({organisation}, {name}, '{constraint}')");

    if !constraint.is_unconstrained() && constraint.version().is_none() {
        let branch_name = &constraint.tag;
        debug!(
            "{organisation}/{name}: no version in '{constraint}', \
             assuming branch '{branch_name}'"
        );
        let branch = remote
            .branch(organisation, name, branch_name)
            .await?
            .ok_or_else(|| {
                SfmError::ConstraintResolution(format!(
                    "{organisation}/{name}: no branch '{branch_name}' found"
                ))
            })?;
        return Ok(Some(ResolvedRef {
            name: branch.name,
            sha: branch.sha,
        }));
    }

    let tags = remote.list_tags(organisation, name).await?;
    let mut candidates: Vec<Candidate> = tags
        .iter()
        .filter_map(|tag| {
            let Some(version) = tag.name.strip_prefix('v') else {
                warn!("{organisation}/{name}: ignoring unversioned tag '{}'", tag.name);
                return None;
            };
            let Some(order) = SemverTag::parse(&tag.name) else {
                warn!("{organisation}/{name}: ignoring semver invalid tag '{}'", tag.name);
                return None;
            };
            Some(Candidate {
                order,
                version: version.to_string(),
                tag,
            })
        })
        .collect();
    candidates.sort_by(|a, b| a.order.cmp(&b.order));

    let (comparator, requested) = match (constraint.comparator, constraint.version()) {
        (Some(comparator), Some(version)) => (comparator, version),
        _ => {
            // No constraint: take the latest release, if there is one.
            let versions: Vec<String> = candidates.iter().map(|c| c.version.clone()).collect();
            let wanted = latest_tag(&versions, false);
            debug!("{organisation}/{name}: no constraint specified, latest is {wanted:?}");
            return Ok(wanted.and_then(|wanted| {
                candidates
                    .iter()
                    .find(|c| c.version == wanted)
                    .map(Candidate::resolved)
            }));
        }
    };

    match comparator {
        Comparator::Equal => match candidates.iter().find(|c| c.version == requested) {
            Some(candidate) => {
                debug!("{organisation}/{name}: found exact version '{requested}'");
                Ok(Some(candidate.resolved()))
            }
            None => Err(SfmError::ConstraintResolution(format!(
                "{organisation}/{name}: could not satisfy constraint '{constraint}', \
                 version {requested} not in tag list"
            ))),
        },
        Comparator::AtLeast => {
            for candidate in candidates.iter().rev() {
                if compare_versions(&candidate.version, requested) == Ordering::Less {
                    // Everything below the requested version is out of
                    // bounds; stop immediately rather than settling.
                    return Err(SfmError::ConstraintResolution(format!(
                        "{organisation}/{name}: no non-prerelease version found for '{constraint}'"
                    )));
                }
                if candidate.order.is_prerelease() {
                    debug!(
                        "{organisation}/{name}: skipping pre-release version '{}'",
                        candidate.version
                    );
                    continue;
                }
                return Ok(Some(candidate.resolved()));
            }
            Err(SfmError::ConstraintResolution(format!(
                "{organisation}/{name}: no non-prerelease version found for '{constraint}'"
            )))
        }
        Comparator::AtMost => {
            for candidate in candidates.iter().rev() {
                if compare_versions(&candidate.version, requested) == Ordering::Greater {
                    continue;
                }
                if candidate.order.is_prerelease() {
                    debug!(
                        "{organisation}/{name}: skipping pre-release version '{}'",
                        candidate.version
                    );
                    continue;
                }
                return Ok(Some(candidate.resolved()));
            }
            Err(SfmError::ConstraintResolution(format!(
                "{organisation}/{name}: no non-prerelease version found for '{constraint}'"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::testing::MockRemote;

    const ORG: &str = "test_organisation";
    const NAME: &str = "test1-formula";

    async fn resolve(remote: &MockRemote, raw: &str) -> Result<Option<ResolvedRef>> {
        let constraint = VersionConstraint::parse(raw);
        resolve_constraint_to_ref(remote, ORG, NAME, &constraint).await
    }

    #[tokio::test]
    async fn greater_than_selects_highest_release() {
        let remote =
            MockRemote::new().with_tags(ORG, NAME, &[("v1.0.1", "sha1"), ("v2.0.1", "sha2")]);
        let resolved = resolve(&remote, ">=v1.1").await.unwrap().unwrap();
        assert_eq!(resolved.name, "v2.0.1");
        assert_eq!(resolved.sha, "sha2");
    }

    #[tokio::test]
    async fn less_than_selects_highest_release_below_bound() {
        let remote =
            MockRemote::new().with_tags(ORG, NAME, &[("v1.0.1", "sha1"), ("v2.0.1", "sha2")]);
        let resolved = resolve(&remote, "<=v1.1").await.unwrap().unwrap();
        assert_eq!(resolved.name, "v1.0.1");
    }

    #[tokio::test]
    async fn exact_version_returns_its_commit() {
        let remote =
            MockRemote::new().with_tags(ORG, NAME, &[("v1.0.1", "sha1"), ("v2.0.1", "sha2")]);
        let resolved = resolve(&remote, "==v1.0.1").await.unwrap().unwrap();
        assert_eq!(resolved.name, "v1.0.1");
        assert_eq!(resolved.sha, "sha1");
    }

    #[tokio::test]
    async fn unsatisfiable_equality_is_an_error() {
        let remote =
            MockRemote::new().with_tags(ORG, NAME, &[("v1.0.1", "sha1"), ("v2.0.1", "sha2")]);
        let err = resolve(&remote, "==v6.6.6").await.unwrap_err();
        assert!(matches!(err, SfmError::ConstraintResolution(_)));
    }

    #[tokio::test]
    async fn unconstrained_selects_latest_release() {
        let remote = MockRemote::new().with_tags(
            ORG,
            NAME,
            &[
                ("v1.0.1", "sha1"),
                ("v2.0.1", "sha2"),
                ("v3.0.0-rc1", "sha3"),
            ],
        );
        let resolved = resolve(&remote, "").await.unwrap().unwrap();
        assert_eq!(resolved.name, "v2.0.1");
    }

    #[tokio::test]
    async fn unconstrained_without_release_tags_is_none() {
        let remote = MockRemote::new().with_tags(ORG, NAME, &[("v1.0.0-rc1", "sha1")]);
        assert!(resolve(&remote, "").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn inequality_skips_prereleases() {
        let remote = MockRemote::new().with_tags(
            ORG,
            NAME,
            &[("v1.0.1", "sha1"), ("v2.0.1-rc1", "sha2")],
        );
        let resolved = resolve(&remote, ">=v1.0.0").await.unwrap().unwrap();
        assert_eq!(resolved.name, "v1.0.1");
    }

    #[tokio::test]
    async fn greater_than_aborts_below_the_bound() {
        // v2.0.1-rc1 is skipped as a prerelease and v1.0.1 is already below
        // the requested version, so the scan must not settle for it.
        let remote = MockRemote::new().with_tags(
            ORG,
            NAME,
            &[("v1.0.1", "sha1"), ("v2.0.1-rc1", "sha2")],
        );
        let err = resolve(&remote, ">=v1.5.0").await.unwrap_err();
        assert!(matches!(err, SfmError::ConstraintResolution(_)));
    }

    #[tokio::test]
    async fn non_version_constraint_resolves_branch() {
        let remote = MockRemote::new().with_branch(ORG, NAME, "my_branch", "branch-sha");
        let resolved = resolve(&remote, "==my_branch").await.unwrap().unwrap();
        assert_eq!(resolved.name, "my_branch");
        assert_eq!(resolved.sha, "branch-sha");
        // The branch path never enumerates tags.
        assert_eq!(remote.call_count(&format!("tags {ORG}/{NAME}")), 0);
    }

    #[tokio::test]
    async fn missing_branch_is_an_error() {
        let remote = MockRemote::new();
        let err = resolve(&remote, "==no-such-branch").await.unwrap_err();
        assert!(matches!(err, SfmError::ConstraintResolution(_)));
    }

    #[tokio::test]
    async fn non_semver_tags_are_ignored_for_selection() {
        let remote = MockRemote::new().with_tags(
            ORG,
            NAME,
            &[("v1.0.1", "sha1"), ("fdfsdfdsfsd", "sha2"), ("1.2.3", "sha3")],
        );
        let resolved = resolve(&remote, "").await.unwrap().unwrap();
        assert_eq!(resolved.name, "v1.0.1");
    }
}
