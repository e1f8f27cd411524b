//! GitHub implementation of the [`RemoteRepository`] interface: tag lists
//! and branch heads via the REST API, file contents via the raw content
//! host. Authentication uses the `GITHUB_TOKEN` bearer credential; its
//! absence is a fatal precondition checked when the client is built, not
//! per call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use sfm_common::config::Config;
use sfm_common::error::{Result, SfmError};
use sfm_common::remote::{BranchRef, RemoteRepository, TagRef};
use tracing::{debug, error, warn};

const REQUEST_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = "sfm formula manager (Rust; +https://github.com/sfm-project/sfm)";

/// Tags are fetched in one page, bounded by this count.
const MAX_TAG_COUNT: usize = 1000;

#[derive(Debug, Deserialize)]
struct CommitPayload {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct TagPayload {
    name: String,
    commit: CommitPayload,
}

#[derive(Debug, Deserialize)]
struct BranchPayload {
    name: String,
    commit: CommitPayload,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: Option<String>,
}

pub struct GithubClient {
    client: Client,
    token: String,
    api_base_url: String,
    raw_base_url: String,
}

impl GithubClient {
    pub fn new(config: &Config) -> Result<Self> {
        let token = config.github_token.clone().ok_or_else(|| {
            SfmError::RemoteConnection(
                "No github token found. Please set your GITHUB_TOKEN environment variable"
                    .to_string(),
            )
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, USER_AGENT_STRING.parse().unwrap());
        headers.insert(ACCEPT, "*/*".parse().unwrap());
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .map_err(|e| SfmError::Api(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            token,
            api_base_url: config.api_base_url.clone(),
            raw_base_url: config.raw_base_url.clone(),
        })
    }

    async fn get(&self, url: &str) -> Result<Response> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .basic_auth(&self.token, Some("x-oauth-basic"))
            .send()
            .await?;
        Ok(response)
    }

    /// Check a non-success response for the known credential problems and
    /// turn everything else into an API error. 404 is handled by the
    /// callers that can treat it as a legitimate absence.
    async fn validate_access(&self, url: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorPayload>()
            .await
            .ok()
            .and_then(|payload| payload.message)
            .unwrap_or_else(|| "No response found".to_string());

        match status {
            StatusCode::UNAUTHORIZED => {
                error!("Github credentials incorrect: {message}");
                Err(SfmError::RemoteConnection(format!(
                    "Github credentials incorrect: {message}"
                )))
            }
            StatusCode::FORBIDDEN => {
                error!("Github credentials failed due to lockout: {message}");
                Err(SfmError::RemoteConnection(format!(
                    "Github access forbidden: {message}"
                )))
            }
            _ => {
                warn!("Unknown problem accessing {url}: {status} {message}");
                Err(SfmError::Api(format!(
                    "Unexpected response {status} for '{url}': {message}"
                )))
            }
        }
    }
}

#[async_trait]
impl RemoteRepository for GithubClient {
    async fn list_tags(&self, organisation: &str, name: &str) -> Result<Vec<TagRef>> {
        let url = format!(
            "{}/repos/{organisation}/{name}/tags?per_page={MAX_TAG_COUNT}",
            self.api_base_url
        );
        let response = self.get(&url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("{organisation}/{name}: no repository or no tags (404)");
            return Ok(Vec::new());
        }
        let response = self.validate_access(&url, response).await?;

        let payload: Vec<TagPayload> = response.json().await?;
        Ok(payload
            .into_iter()
            .map(|tag| TagRef {
                name: tag.name,
                sha: tag.commit.sha,
            })
            .collect())
    }

    async fn branch(
        &self,
        organisation: &str,
        name: &str,
        branch: &str,
    ) -> Result<Option<BranchRef>> {
        let url = format!(
            "{}/repos/{organisation}/{name}/branches/{branch}",
            self.api_base_url
        );
        let response = self.get(&url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("{organisation}/{name}: branch '{branch}' not found");
            return Ok(None);
        }
        let response = self.validate_access(&url, response).await?;

        let payload: BranchPayload = response.json().await?;
        Ok(Some(BranchRef {
            name: payload.name,
            sha: payload.commit.sha,
        }))
    }

    async fn fetch_file(
        &self,
        organisation: &str,
        name: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<String>> {
        let url = format!(
            "{}/{organisation}/{name}/{git_ref}/{path}",
            self.raw_base_url
        );
        let response = self.get(&url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("{organisation}/{name}: no '{path}' at '{git_ref}'");
            return Ok(None);
        }
        let response = self.validate_access(&url, response).await?;
        Ok(Some(response.text().await?))
    }
}
