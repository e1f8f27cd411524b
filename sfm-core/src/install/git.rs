//! git2 plumbing for the materializer: open-or-clone, local revision
//! lookup, and hard checkout at a commit.

use std::path::Path;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{BranchType, Cred, FetchOptions, Oid, RemoteCallbacks, Repository};
use tracing::debug;

use sfm_common::error::{Result, SfmError};

fn remote_callbacks<'a>(token: Option<String>) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, _allowed| match &token {
        Some(token) => Cred::userpass_plaintext(token, "x-oauth-basic"),
        None => Cred::ssh_key_from_agent(username_from_url.unwrap_or("git")),
    });
    callbacks
}

/// Rewrite a `git@host:org/name.git` source to its https form, used when a
/// token is available for auth.
fn https_url(source: &str) -> Option<String> {
    let rest = source.strip_prefix("git@")?;
    let (host, path) = rest.split_once(':')?;
    Some(format!("https://{host}/{path}"))
}

/// Open an existing checkout, or clone the repository into `path`.
pub fn open_or_clone(source: &str, path: &Path, token: Option<&str>) -> Result<Repository> {
    if path.is_dir() {
        debug!(
            "Opening '{source}' with existing local repository '{}'",
            path.display()
        );
        return Ok(Repository::open(path)?);
    }

    let url = match token {
        Some(_) => {
            debug!("Found github token, using it for auth");
            https_url(source).unwrap_or_else(|| source.to_string())
        }
        None => source.to_string(),
    };

    debug!("Cloning '{url}' into local repository '{}'", path.display());
    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(remote_callbacks(token.map(str::to_string)));
    let repo = RepoBuilder::new()
        .fetch_options(fetch_options)
        .clone(&url, path)?;
    Ok(repo)
}

fn fetch_origin(repo: &Repository, token: Option<&str>) -> Result<()> {
    let mut origin = repo.find_remote("origin")?;
    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(remote_callbacks(token.map(str::to_string)));
    origin.fetch(&[] as &[&str], Some(&mut fetch_options), None)?;
    Ok(())
}

/// Resolve a tag (or anything `rev-parse` understands) to a commit sha,
/// falling back to the matching remote branch head. `None` when neither
/// exists.
pub fn revision_sha(repo: &Repository, refname: &str) -> Result<Option<String>> {
    match repo.revparse_single(refname) {
        Ok(object) => {
            // An annotated tag refs a tag object; peel to the commit.
            let commit = object.peel_to_commit()?;
            Ok(Some(commit.id().to_string()))
        }
        Err(_) => {
            debug!("Could not rev-parse '{refname}', trying remote branch");
            let branch = repo.find_branch(&format!("origin/{refname}"), BranchType::Remote);
            Ok(branch
                .ok()
                .and_then(|branch| branch.get().target())
                .map(|oid| oid.to_string()))
        }
    }
}

/// Check out the tree at `sha` and detach HEAD onto it, fetching from
/// origin first if the commit is not yet available locally.
pub fn checkout_revision(repo: &Repository, sha: &str, token: Option<&str>) -> Result<()> {
    let oid = Oid::from_str(sha)
        .map_err(|e| SfmError::Install(format!("Invalid sha '{sha}': {e}")))?;

    let object = match repo.find_object(oid, None) {
        Ok(object) => object,
        Err(_) => {
            debug!("Commit '{sha}' not present locally, fetching origin");
            fetch_origin(repo, token)?;
            repo.find_object(oid, None)?
        }
    };

    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_tree(&object, Some(&mut checkout))?;
    repo.set_head_detached(oid)?;
    debug!("Checked out '{sha}' in '{}'", repo.path().display());
    Ok(())
}

/// Sha of HEAD for the repository at `path`, if it is one.
pub fn head_sha(path: &Path) -> Option<String> {
    let repo = Repository::open(path).ok()?;
    let head = repo.head().ok()?;
    head.target().map(|oid| oid.to_string())
}
