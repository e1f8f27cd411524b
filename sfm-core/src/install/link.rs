//! Symlinking of checked-out formulas into the salt root: each formula's
//! exported directories are linked in, and the salt dynamic module
//! directories are merged file by file.

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::Path;

use tracing::{debug, info, warn};

use sfm_common::error::{Result, SfmError};
use sfm_common::manifest::Manifest;
use sfm_common::model::{FormulaDependency, FormulaKey};

/// Directories of dynamically loaded salt modules, merged across formulas.
const DYNAMIC_MODULE_DIRS: [&str; 5] =
    ["_modules", "_grains", "_renderers", "_returners", "_states"];

/// Link every dependency's exports into the salt root.
pub fn update_root_links(
    repos_dir: &Path,
    salt_root: &Path,
    dependencies: &BTreeMap<FormulaKey, FormulaDependency>,
) -> Result<()> {
    for dep in dependencies.values() {
        let name = &dep.key.name;
        for export in formula_exports(repos_dir, name) {
            // Prefer the exported subdirectory; fall back to linking the
            // whole repository under its own name.
            let candidates = [
                (repos_dir.join(name).join(&export), salt_root.join(&export)),
                (repos_dir.join(name), salt_root.join(name)),
            ];

            let mut linked = false;
            for (source, target) in &candidates {
                if !source.exists() {
                    continue;
                }
                if target.exists() {
                    return Err(SfmError::Install(format!(
                        "Target '{}' conflicts with something else",
                        target.display()
                    )));
                }
                relative_symlink(source, target)?;
                info!("Linking {} to {}", source.display(), target.display());
                linked = true;
                break;
            }

            if !linked {
                return Err(SfmError::Install(format!(
                    "Could not find target link for formula '{name}'"
                )));
            }
            link_dynamic_modules(repos_dir, salt_root, name)?;
        }
    }
    Ok(())
}

/// The directories a formula wants linked into the salt root, from the
/// `exports` key of its checked-out manifest. An unreadable manifest or a
/// missing key defaults to the formula name with a trailing `-formula`
/// stripped.
fn formula_exports(repos_dir: &Path, name: &str) -> Vec<String> {
    let default = vec![name.strip_suffix("-formula").unwrap_or(name).to_string()];

    let metadata_path = repos_dir.join(name).join("metadata.yml");
    let exports = fs::read_to_string(&metadata_path)
        .ok()
        .and_then(|text| Manifest::parse(&text).ok())
        .and_then(|manifest| manifest.exports);
    match exports {
        Some(exports) if !exports.is_empty() => {
            debug!("Formula '{name}' exports {exports:?}");
            exports
        }
        _ => {
            debug!("No exports for '{name}', defaulting to {default:?}");
            default
        }
    }
}

fn link_dynamic_modules(repos_dir: &Path, salt_root: &Path, name: &str) -> Result<()> {
    let repo_dir = repos_dir.join(name);

    for module_dir in DYNAMIC_MODULE_DIRS {
        let source_dir = repo_dir.join(module_dir);
        if !source_dir.is_dir() {
            continue;
        }
        let target_dir = salt_root.join(module_dir);
        if !target_dir.is_dir() {
            fs::create_dir_all(&target_dir)?;
        }

        for entry in fs::read_dir(&source_dir)? {
            let entry = entry?;
            let source = entry.path();
            let target = target_dir.join(entry.file_name());
            match relative_symlink(&source, &target) {
                Ok(()) => debug!("Linked dynamic module {}", source.display()),
                Err(SfmError::Io(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    warn!(
                        "Not linking {} as link already exists",
                        source.display()
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}

/// Create `target` as a symlink to `source`, relative to the target's
/// parent directory.
fn relative_symlink(source: &Path, target: &Path) -> Result<()> {
    let base = target.parent().unwrap_or_else(|| Path::new("."));
    let relative = pathdiff::diff_paths(source, base).unwrap_or_else(|| source.to_path_buf());
    unix_fs::symlink(&relative, target)?;
    Ok(())
}
