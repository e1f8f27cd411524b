//! Formula manifest (`metadata.yml`) parsing.
//!
//! A manifest is a mapping with an optional `formula: "org/name"` root
//! identity, an optional list of dependency constraint strings and an
//! optional list of exported directories. Shape problems are caught here and
//! surface as configuration errors rather than deep inside resolution.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Result, SfmError};
use crate::model::{FormulaDependency, FormulaKey};

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    formula: Option<String>,
    #[serde(default)]
    dependencies: Option<Vec<String>>,
    #[serde(default)]
    exports: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// The root formula's own identity; absent for deploy-style manifests.
    pub formula: Option<FormulaKey>,
    pub dependencies: BTreeMap<FormulaKey, FormulaDependency>,
    pub exports: Option<Vec<String>>,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawManifest = serde_yaml::from_str(text)
            .map_err(|e| SfmError::Config(format!("Error in manifest format: {e}")))?;

        let formula = match raw.formula {
            Some(name) => Some(FormulaKey::from_str(&name)?),
            None => {
                debug!("No root formula name found, assuming a deploy formula");
                None
            }
        };

        let entries = raw.dependencies.unwrap_or_default();
        if entries.is_empty() {
            debug!("No dependencies found in manifest");
        }

        let mut dependencies = BTreeMap::new();
        let mut seen_names: Vec<String> = Vec::new();
        for entry in &entries {
            let dependency = FormulaDependency::parse_entry(entry)?;
            // Only the first formula of a given name counts, even across
            // organisations.
            if seen_names.contains(&dependency.key.name) {
                warn!("Skipping duplicate dependency {}", dependency.key.name);
                continue;
            }
            seen_names.push(dependency.key.name.clone());
            dependencies.insert(dependency.key.clone(), dependency);
        }

        Ok(Self {
            formula,
            dependencies,
            exports: raw.exports,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SfmError::Config(format!(
                "Error loading manifest, file does not exist: {}",
                path.display()
            )));
        }
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_manifest() {
        let text = "\
formula: test_organisation/my-formula
dependencies:
  - git@github.com:test_organisation/test1-formula.git==v1.0.1
  - test_organisation/test2-formula>=v2.0
  - test_organisation/test3-formula
";
        let manifest = Manifest::parse(text).unwrap();
        assert_eq!(
            manifest.formula.as_ref().unwrap().to_string(),
            "test_organisation/my-formula"
        );
        assert_eq!(manifest.dependencies.len(), 3);

        let key = FormulaKey::new("test_organisation", "test1-formula");
        let dep = &manifest.dependencies[&key];
        assert_eq!(dep.constraint.to_string(), "==v1.0.1");
    }

    #[test]
    fn parse_deploy_manifest_without_identity() {
        let manifest = Manifest::parse("dependencies:\n  - org/a-formula\n").unwrap();
        assert!(manifest.formula.is_none());
        assert_eq!(manifest.dependencies.len(), 1);
    }

    #[test]
    fn parse_manifest_without_dependencies() {
        let manifest = Manifest::parse("formula: org/my-formula\n").unwrap();
        assert!(manifest.dependencies.is_empty());
    }

    #[test]
    fn duplicate_names_keep_first_occurrence() {
        let text = "\
dependencies:
  - first_org/dup-formula==v1.0.0
  - second_org/dup-formula==v2.0.0
";
        let manifest = Manifest::parse(text).unwrap();
        assert_eq!(manifest.dependencies.len(), 1);
        let key = FormulaKey::new("first_org", "dup-formula");
        assert_eq!(manifest.dependencies[&key].constraint.tag, "v1.0.0");
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let err = Manifest::parse("dependencies: [unterminated").unwrap_err();
        assert!(matches!(err, SfmError::Config(_)));
    }

    #[test]
    fn non_mapping_document_is_a_config_error() {
        let err = Manifest::parse("- just\n- a\n- list\n").unwrap_err();
        assert!(matches!(err, SfmError::Config(_)));
    }

    #[test]
    fn bad_root_identity_is_a_config_error() {
        let err = Manifest::parse("formula: not-a-pair\n").unwrap_err();
        assert!(matches!(err, SfmError::Config(_)));
    }

    #[test]
    fn exports_are_passed_through() {
        let manifest = Manifest::parse("exports:\n  - foo\n  - bar\n").unwrap();
        assert_eq!(
            manifest.exports,
            Some(vec!["foo".to_string(), "bar".to_string()])
        );
    }
}
