use std::path::{Path, PathBuf};

use stagedrift_core::Outcome;
use stagedrift_vcs::VersionControl;
use tempfile::TempDir;
use tracing::{debug, warn};

/// A private, disposable clone of the source repository.
///
/// All checkouts of a comparison happen here, never in the caller's
/// repository. The temporary tree is removed when the workspace is dropped,
/// whether the comparison succeeded, failed or unwound.
#[derive(Debug)]
pub struct IsolatedWorkspace {
    dir: Option<TempDir>,
    repo: PathBuf,
}

impl IsolatedWorkspace {
    /// Clone `source` into a fresh temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`stagedrift_core::DriftError::Io`] if the directory cannot be
    /// created, or the provider's error if the clone fails. The directory is
    /// removed in both cases.
    pub fn create(vcs: &dyn VersionControl, source: &Path) -> Outcome<Self> {
        let dir = tempfile::Builder::new()
            .prefix("stagedrift-ws-")
            .tempdir()?;
        let repo = dir.path().join("repo");
        vcs.clone_repo(source, &repo)?;
        debug!(workspace = %repo.display(), "workspace ready");
        Ok(Self {
            dir: Some(dir),
            repo,
        })
    }

    /// Root of the cloned working tree.
    pub fn path(&self) -> &Path {
        &self.repo
    }
}

impl Drop for IsolatedWorkspace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let root = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => debug!(workspace = %root.display(), "workspace removed"),
            Err(e) => warn!(workspace = %root.display(), error = %e, "failed to remove workspace"),
        }
    }
}

/// Run `scope` against a fresh workspace cloned from `source`.
///
/// The workspace is torn down before this returns, including when `scope`
/// fails.
pub fn with_isolated_workspace<T>(
    vcs: &dyn VersionControl,
    source: &Path,
    scope: impl FnOnce(&IsolatedWorkspace) -> Outcome<T>,
) -> Outcome<T> {
    let workspace = IsolatedWorkspace::create(vcs, source)?;
    scope(&workspace)
}
