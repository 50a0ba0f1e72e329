//! In-memory provider and cache puller for unit tests.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use stagedrift_core::{DriftError, Outcome, Reference};
use stagedrift_vcs::{CachePuller, VersionControl};

/// Each reference is a full list of `(path, content)` files.
///
/// A clone starts with `HEAD` at the last snapshot added, without files.
#[derive(Default)]
pub(crate) struct FakeVcs {
    snapshots: BTreeMap<String, Vec<(String, String)>>,
    order: Vec<String>,
    heads: Mutex<HashMap<PathBuf, String>>,
    fail_clone: bool,
    fail_diff: bool,
}

impl FakeVcs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_snapshot(mut self, reference: &str, files: &[(&str, &str)]) -> Self {
        let files = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        self.snapshots.insert(reference.to_string(), files);
        self.order.push(reference.to_string());
        self
    }

    pub(crate) fn failing_clone(mut self) -> Self {
        self.fail_clone = true;
        self
    }

    pub(crate) fn failing_diff(mut self) -> Self {
        self.fail_diff = true;
        self
    }

    fn content(&self, reference: &Reference, file: &str) -> Option<&str> {
        self.snapshots
            .get(reference.as_str())?
            .iter()
            .find(|(p, _)| p == file)
            .map(|(_, c)| c.as_str())
    }
}

impl VersionControl for FakeVcs {
    fn clone_repo(&self, _source: &Path, dest: &Path) -> Outcome<()> {
        if self.fail_clone {
            return Err(DriftError::Git("clone refused".into()));
        }
        std::fs::create_dir_all(dest)?;
        if let Some(tip) = self.order.last() {
            self.heads
                .lock()
                .unwrap()
                .insert(dest.to_path_buf(), tip.clone());
        }
        Ok(())
    }

    fn checkout(&self, repo: &Path, reference: &Reference) -> Outcome<()> {
        let files = self
            .snapshots
            .get(reference.as_str())
            .ok_or_else(|| DriftError::CheckoutFailed {
                reference: reference.to_string(),
                detail: "pathspec did not match".into(),
            })?;
        for entry in std::fs::read_dir(repo)? {
            let path = entry?.path();
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }
        for (path, content) in files {
            let target = repo.join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(target, content)?;
        }
        self.heads
            .lock()
            .unwrap()
            .insert(repo.to_path_buf(), reference.to_string());
        Ok(())
    }

    fn rev_parse_head(&self, repo: &Path) -> Outcome<Reference> {
        self.heads
            .lock()
            .unwrap()
            .get(repo)
            .map(|r| Reference::new(r.as_str()))
            .ok_or_else(|| DriftError::Git("no HEAD".into()))
    }

    fn resolve(&self, repo: &Path, name: &str) -> Outcome<Reference> {
        if name == "HEAD" {
            return self.rev_parse_head(repo);
        }
        if self.snapshots.contains_key(name) {
            return Ok(Reference::from(name));
        }
        Err(DriftError::CheckoutFailed {
            reference: name.to_string(),
            detail: "unknown revision".into(),
        })
    }

    fn diff_numstat(
        &self,
        _repo: &Path,
        old: &Reference,
        new: &Reference,
        file: &str,
    ) -> Outcome<String> {
        if self.fail_diff {
            return Err(DriftError::Git(format!("bad revision '{old}..{new}'")));
        }
        let before = self.content(old, file).unwrap_or("");
        let after = self.content(new, file).unwrap_or("");
        if before == after {
            return Ok(String::new());
        }
        Ok(format!(
            "{}\t{}\t{file}\n",
            after.lines().count(),
            before.lines().count()
        ))
    }

    fn recent_commits(&self, _repo: &Path, count: usize) -> Outcome<Vec<Reference>> {
        let skip = self.order.len().saturating_sub(count);
        Ok(self.order[skip..]
            .iter()
            .map(|r| Reference::new(r.as_str()))
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct FakeCache {
    fail: bool,
    calls: AtomicUsize,
}

impl FakeCache {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CachePuller for FakeCache {
    fn pull(&self, _repo: &Path) -> Outcome<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DriftError::CacheUnavailable("no remote configured".into()));
        }
        Ok(())
    }
}
