//! In-memory `RemoteRepository` fake used by the resolution tests. Records
//! per-call counters so tests can assert how often the remote was hit.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::remote::{BranchRef, RemoteRepository, TagRef};

#[derive(Default)]
pub(crate) struct MockRemote {
    tags: HashMap<(String, String), Vec<TagRef>>,
    branches: HashMap<(String, String, String), BranchRef>,
    files: HashMap<(String, String, String), String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(mut self, org: &str, name: &str, tags: &[(&str, &str)]) -> Self {
        let tags = tags
            .iter()
            .map(|(tag, sha)| TagRef {
                name: tag.to_string(),
                sha: sha.to_string(),
            })
            .collect();
        self.tags.insert((org.to_string(), name.to_string()), tags);
        self
    }

    pub fn with_branch(mut self, org: &str, name: &str, branch: &str, sha: &str) -> Self {
        self.branches.insert(
            (org.to_string(), name.to_string(), branch.to_string()),
            BranchRef {
                name: branch.to_string(),
                sha: sha.to_string(),
            },
        );
        self
    }

    pub fn with_file(mut self, org: &str, name: &str, path: &str, contents: &str) -> Self {
        self.files.insert(
            (org.to_string(), name.to_string(), path.to_string()),
            contents.to_string(),
        );
        self
    }

    pub fn call_count(&self, what: &str) -> usize {
        *self.calls.lock().unwrap().get(what).unwrap_or(&0)
    }

    fn record(&self, what: String) {
        *self.calls.lock().unwrap().entry(what).or_insert(0) += 1;
    }
}

#[async_trait]
impl RemoteRepository for MockRemote {
    async fn list_tags(&self, organisation: &str, name: &str) -> Result<Vec<TagRef>> {
        self.record(format!("tags {organisation}/{name}"));
        Ok(self
            .tags
            .get(&(organisation.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn branch(
        &self,
        organisation: &str,
        name: &str,
        branch: &str,
    ) -> Result<Option<BranchRef>> {
        self.record(format!("branch {organisation}/{name}"));
        Ok(self
            .branches
            .get(&(
                organisation.to_string(),
                name.to_string(),
                branch.to_string(),
            ))
            .cloned())
    }

    async fn fetch_file(
        &self,
        organisation: &str,
        name: &str,
        _git_ref: &str,
        path: &str,
    ) -> Result<Option<String>> {
        self.record(format!("file {organisation}/{name}/{path}"));
        Ok(self
            .files
            .get(&(organisation.to_string(), name.to_string(), path.to_string()))
            .cloned())
    }
}
