// sfm-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::Result;

const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
const DEFAULT_RAW_BASE_URL: &str = "https://raw.githubusercontent.com";

pub const METADATA_FILENAME: &str = "metadata.yml";
pub const REQUIREMENTS_FILENAME: &str = "formula-requirements.txt";

const VENDOR_DIR: &str = "vendor";
const REPOS_DIR: &str = "formula-repos";
const SALT_ROOT_DIR: &str = "_root";

#[derive(Debug, Clone)]
pub struct Config {
    pub root_dir: PathBuf,
    pub api_base_url: String,
    pub raw_base_url: String,
    pub github_token: Option<String>,
}

impl Config {
    /// Build a configuration rooted at `root_dir`, picking up the GitHub
    /// credential and endpoint overrides from the environment.
    pub fn load(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        debug!("Loading sfm configuration for {}", root_dir.display());

        let api_base_url = env::var("SFM_GITHUB_API_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let raw_base_url = env::var("SFM_GITHUB_RAW_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_RAW_BASE_URL.to_string());
        let github_token = env::var("GITHUB_TOKEN").ok().filter(|s| !s.is_empty());

        Ok(Self {
            root_dir,
            api_base_url,
            raw_base_url,
            github_token,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Path of the root formula's own manifest.
    pub fn metadata_path(&self) -> PathBuf {
        self.root_dir.join(METADATA_FILENAME)
    }

    /// Path of the pinned requirements lockfile.
    pub fn requirements_path(&self) -> PathBuf {
        self.root_dir.join(REQUIREMENTS_FILENAME)
    }

    pub fn vendor_dir(&self) -> PathBuf {
        self.root_dir.join(VENDOR_DIR)
    }

    /// Directory the formula repositories are checked out into.
    pub fn repos_dir(&self) -> PathBuf {
        self.vendor_dir().join(REPOS_DIR)
    }

    /// The salt file root; holds only symlinks into `repos_dir` and is
    /// recreated on every install.
    pub fn salt_root_dir(&self) -> PathBuf {
        self.vendor_dir().join(SALT_ROOT_DIR)
    }
}
