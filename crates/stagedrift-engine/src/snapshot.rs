use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use stagedrift_core::{Outcome, Reference, StageSpec};
use stagedrift_vcs::{CachePuller, VersionControl};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Copies of every declared stage path as they exist at one reference.
///
/// Built once by [`materialize`] and read-only afterwards. The backing
/// directory is removed when the area is dropped.
#[derive(Debug)]
pub struct HoldingArea {
    dir: TempDir,
    reference: Reference,
}

impl HoldingArea {
    /// Directory holding the copies, laid out like the repository.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The commit these copies were taken from.
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Location of a declared path inside the area, if it was present.
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        let candidate = self.root().join(path);
        candidate.exists().then_some(candidate)
    }

    /// Repository-relative paths of the files at or under `path`, sorted.
    pub fn files_under(&self, path: &str) -> Vec<String> {
        let Some(start) = self.resolve(path) else {
            return Vec::new();
        };
        if start.is_file() {
            return vec![path.to_string()];
        }
        let mut files: Vec<String> = WalkBuilder::new(&start)
            .standard_filters(false)
            .follow_links(true)
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(self.root())
                    .ok()
                    .map(relative_string)
            })
            .collect();
        files.sort();
        files
    }
}

fn relative_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Declared paths must stay inside the repository.
fn is_contained(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Check out `reference` in `workspace` and copy every declared path out.
///
/// A failed checkout aborts the comparison. A failed cache pull is logged and
/// the copy proceeds with whatever the checkout produced. Paths that do not
/// exist are left out of the area. Symlinks are copied as the files they
/// point to.
///
/// # Errors
///
/// Returns [`stagedrift_core::DriftError::CheckoutFailed`] (or another
/// provider error) from the checkout, or an I/O error from copying.
pub fn materialize(
    vcs: &dyn VersionControl,
    cache: &dyn CachePuller,
    workspace: &Path,
    reference: &Reference,
    stages: &[StageSpec],
) -> Outcome<HoldingArea> {
    vcs.checkout(workspace, reference)?;
    if let Err(e) = cache.pull(workspace) {
        warn!(reference = %reference.short(), error = %e, "data cache unavailable, using checked-out files");
    }
    let reference = vcs
        .rev_parse_head(workspace)
        .unwrap_or_else(|_| reference.clone());

    let dir = tempfile::Builder::new()
        .prefix("stagedrift-snap-")
        .tempdir()?;
    for stage in stages {
        for path in stage.all_paths() {
            let source = workspace.join(path);
            if !is_contained(path) || !source.exists() {
                debug!(stage = %stage.name, path, "declared path absent");
                continue;
            }
            copy_tree(&source, &dir.path().join(path))?;
        }
    }

    info!(reference = %reference.short(), holding_area = %dir.path().display(), "snapshot materialized");
    Ok(HoldingArea { dir, reference })
}

fn copy_tree(source: &Path, dest: &Path) -> Outcome<()> {
    if source.is_file() {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(source, dest)?;
        return Ok(());
    }

    let walker = WalkBuilder::new(source)
        .standard_filters(false)
        .follow_links(true)
        .build();
    for entry in walker {
        // dangling links from an unpulled cache
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(source = %source.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = dest.join(relative);
        match entry.file_type() {
            Some(t) if t.is_dir() => std::fs::create_dir_all(&target)?,
            Some(t) if t.is_file() => {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(entry.path(), &target)?;
            }
            _ => {}
        }
    }
    Ok(())
}
