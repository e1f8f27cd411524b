use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{Result, SfmError};
use crate::model::version::VersionConstraint;

static GIT_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^git@([^:/]+):([^/]+)/(.+?)\.git\s*(.*)$").unwrap());
static SIMPLE_ENTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+?)\s*([=><]{2})\s*(\S+)$").unwrap());

const DEFAULT_GIT_HOST: &str = "github.com";

/// Identity of a formula repository: `(organisation, name)`, case sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormulaKey {
    pub organisation: String,
    pub name: String,
}

impl FormulaKey {
    pub fn new(organisation: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            organisation: organisation.into(),
            name: name.into(),
        }
    }

    /// Canonical clone URL for this formula.
    pub fn source_url(&self) -> String {
        format!(
            "git@{}:{}/{}.git",
            DEFAULT_GIT_HOST, self.organisation, self.name
        )
    }
}

impl fmt::Display for FormulaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.organisation, self.name)
    }
}

impl FromStr for FormulaKey {
    type Err = SfmError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(org), Some(name), None) if !org.is_empty() && !name.is_empty() => {
                Ok(Self::new(org, name))
            }
            _ => Err(SfmError::Config(format!(
                "Bad formula name '{s}', expected '<organisation>/<formula-name>'"
            ))),
        }
    }
}

/// One entry in the dependency set being resolved: where the formula lives,
/// what constraint currently applies to it, which constraint strings have
/// already been sourced for it, and (once finalized) the concrete revision.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaDependency {
    pub key: FormulaKey,
    pub source: String,
    pub constraint: VersionConstraint,
    pub sourced_constraints: Vec<String>,
    pub resolved_sha: Option<String>,
    pub resolved_tag: Option<String>,
}

impl FormulaDependency {
    pub fn new(key: FormulaKey, constraint: VersionConstraint) -> Self {
        let source = key.source_url();
        Self {
            key,
            source,
            constraint,
            sourced_constraints: Vec::new(),
            resolved_sha: None,
            resolved_tag: None,
        }
    }

    /// Parse a clone URL of the form
    /// `git@github.com:org/some-formula.git==v1.0.1`, with or without the
    /// trailing constraint.
    pub fn from_git_url(url: &str) -> Result<Self> {
        let caps = GIT_URL_RE.captures(url.trim()).ok_or_else(|| {
            SfmError::Config(format!("Could not parse repository url '{url}'"))
        })?;
        let host = &caps[1];
        let key = FormulaKey::new(&caps[2], &caps[3]);
        let trailing = caps[4].trim();
        let constraint = VersionConstraint::parse(trailing);
        if !trailing.is_empty() && constraint.is_unconstrained() {
            return Err(SfmError::ConstraintFormat(format!(
                "Unrecognized constraint '{trailing}' in '{url}'"
            )));
        }
        debug!("Parsed '{url}' as {key} with constraint '{constraint}'");
        Ok(Self {
            source: format!("git@{}:{}/{}.git", host, key.organisation, key.name),
            key,
            constraint,
            sourced_constraints: Vec::new(),
            resolved_sha: None,
            resolved_tag: None,
        })
    }

    /// Parse a requirement entry in any of its accepted shapes: a full git
    /// URL, `org/name==v1.0`, or a bare `org/name`.
    pub fn parse_entry(entry: &str) -> Result<Self> {
        let entry = entry.trim();
        if entry.contains(".git") || entry.contains("git@") {
            return Self::from_git_url(entry);
        }

        if let Some(caps) = SIMPLE_ENTRY_RE.captures(entry) {
            let key = FormulaKey::from_str(&caps[1])?;
            let raw = format!("{}{}", &caps[2], &caps[3]);
            let constraint = VersionConstraint::parse(&raw);
            if constraint.is_unconstrained() {
                return Err(SfmError::ConstraintFormat(format!(
                    "Unrecognized constraint '{raw}' in '{entry}'"
                )));
            }
            return Ok(Self::new(key, constraint));
        }

        let key = FormulaKey::from_str(entry)?;
        Ok(Self::new(key, VersionConstraint::unconstrained()))
    }

    /// The `org/name==version` form used for requirement output lines,
    /// preferring the resolved tag over the raw constraint tag.
    pub fn requirement_line(&self) -> Option<String> {
        let version = self
            .resolved_tag
            .as_deref()
            .or_else(|| (!self.constraint.tag.is_empty()).then_some(self.constraint.tag.as_str()))?;
        Some(format!("{}=={}", self.key, version))
    }
}
