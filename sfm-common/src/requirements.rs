//! The pinned requirements lockfile (`formula-requirements.txt`): one
//! `git@<host>:<org>/<name>.git==<tag_or_sha>` entry per line. Comments and
//! blank lines are ignored on read; output is newline terminated. The file
//! is both an input (pinned mode) and an output (after a fresh resolution).

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::Result;
use crate::model::FormulaDependency;

/// Parse requirement entries from lockfile text.
pub fn parse(text: &str) -> Result<Vec<FormulaDependency>> {
    let mut dependencies = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        dependencies.push(FormulaDependency::parse_entry(line)?);
    }
    Ok(dependencies)
}

/// Load a lockfile, `None` when it does not exist or holds no entries.
pub fn load(path: &Path) -> Result<Option<Vec<FormulaDependency>>> {
    if !path.exists() {
        debug!("Requirements file not found: {}", path.display());
        return Ok(None);
    }
    let text = fs::read_to_string(path)?;
    let dependencies = parse(&text)?;
    if dependencies.is_empty() {
        warn!("Requirements file '{}' is empty", path.display());
        return Ok(None);
    }
    Ok(Some(dependencies))
}

/// Write requirement lines out, newline terminated. Refuses to overwrite an
/// existing file unless told to; optionally keeps the previous file around
/// as `<name>.last`.
pub fn write(path: &Path, lines: &[String], overwrite: bool, backup: bool) -> Result<bool> {
    if path.exists() {
        if !overwrite {
            warn!(
                "Requirements file '{}' exists, not writing...",
                path.display()
            );
            return Ok(false);
        }
        if backup {
            let backup_path = path.with_extension("txt.last");
            fs::rename(path, &backup_path)?;
            debug!(
                "Renamed existing requirements file to {}",
                backup_path.display()
            );
        }
    }

    let mut contents = lines.join("\n");
    contents.push('\n');
    fs::write(path, contents)?;
    debug!("Wrote requirements file '{}'", path.display());
    Ok(true)
}

/// Diff two requirement line sets into (current, new) pairs keyed by
/// formula: an absent side marks an added or deprecated entry, two present
/// sides mark a version change. Unchanged entries are omitted.
pub fn compare(current: &[String], new: &[String]) -> Vec<(Option<String>, Option<String>)> {
    let keyed = |lines: &[String]| -> Vec<(String, String)> {
        lines
            .iter()
            .map(|line| {
                let key = line.split("==").next().unwrap_or(line).to_string();
                (key, line.clone())
            })
            .collect()
    };
    let current_keyed = keyed(current);
    let new_keyed = keyed(new);

    let mut keys: Vec<&String> = current_keyed.iter().map(|(k, _)| k).collect();
    for (key, _) in &new_keyed {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    let mut diff = Vec::new();
    for key in keys {
        let old_line = current_keyed.iter().find(|(k, _)| k == key).map(|(_, l)| l);
        let new_line = new_keyed.iter().find(|(k, _)| k == key).map(|(_, l)| l);
        match (old_line, new_line) {
            (Some(old), Some(new)) if old == new => {}
            (old, new) => diff.push((old.cloned(), new.cloned())),
        }
    }
    diff
}
