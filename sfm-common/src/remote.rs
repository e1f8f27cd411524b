//! The narrow interface the resolution engine needs from a repository
//! hosting provider. `Ok(None)` means "legitimately absent" (no such
//! branch, no such file); errors are reserved for credential, connection
//! and malformed-response problems.

use async_trait::async_trait;

use crate::error::Result;

/// A tag together with the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    pub name: String,
    pub sha: String,
}

/// A branch head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRef {
    pub name: String,
    pub sha: String,
}

/// The single concrete revision a constraint resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub name: String,
    pub sha: String,
}

#[async_trait]
pub trait RemoteRepository: Send + Sync {
    /// All tags of the repository with their commit SHAs.
    async fn list_tags(&self, organisation: &str, name: &str) -> Result<Vec<TagRef>>;

    /// Head of a named branch, `None` if the branch does not exist.
    async fn branch(
        &self,
        organisation: &str,
        name: &str,
        branch: &str,
    ) -> Result<Option<BranchRef>>;

    /// Contents of a file at a given ref, `None` if the file (or the ref)
    /// does not exist.
    async fn fetch_file(
        &self,
        organisation: &str,
        name: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<String>>;
}
