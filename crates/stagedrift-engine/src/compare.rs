use std::path::{Path, PathBuf};

use stagedrift_core::{ComparisonResult, DriftConfig, DriftError, Outcome, Reference, StageSpec};
use stagedrift_vcs::{cache, CachePuller, GitCli, VersionControl};
use tracing::{debug, error, info, warn};

use crate::aggregate::compare_stages;
use crate::report;
use crate::snapshot::materialize;
use crate::stages::{load_stages, merge_stages};
use crate::summary::ComparisonSummary;
use crate::workspace::with_isolated_workspace;

/// Outcome of one successful comparison.
#[derive(Debug, Clone)]
pub struct Comparison {
    /// Baseline reference.
    pub old: Reference,
    /// Compared reference; the report is named after it.
    pub new: Reference,
    /// Per-stage, per-file metrics.
    pub result: ComparisonResult,
    /// Roll-up of `result`.
    pub summary: ComparisonSummary,
    /// Where the report was written.
    pub report_path: PathBuf,
}

/// Runs comparisons between references of a repository.
///
/// Each comparison works in its own isolated clone, so the caller's working
/// tree is never touched.
pub struct Comparator {
    vcs: Box<dyn VersionControl>,
    cache: Box<dyn CachePuller>,
    config: DriftConfig,
}

impl Comparator {
    /// Build a comparator from explicit collaborators.
    pub fn new(
        vcs: Box<dyn VersionControl>,
        cache: Box<dyn CachePuller>,
        config: DriftConfig,
    ) -> Self {
        Self { vcs, cache, config }
    }

    /// Build a comparator using the `git` CLI and the configured cache puller.
    pub fn from_config(config: DriftConfig) -> Self {
        let timeout = config.tools.timeout();
        Self::new(
            Box::new(GitCli::from_config(&config.tools)),
            cache::from_config(&config.cache, timeout),
            config,
        )
    }

    /// The configuration in use.
    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Compare `old` against `new` in a clone of `source` and persist the report.
    ///
    /// The stage graph is the union of the graphs declared at both
    /// references, so stages and paths that exist on one side only are
    /// scored too. Nothing is written when the comparison fails fatally.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: a failed clone or checkout, a pipeline
    /// file missing at `new`, or a malformed pipeline file at either side.
    pub fn compare_references(
        &self,
        source: &Path,
        old: &Reference,
        new: &Reference,
        output_dir: &Path,
    ) -> Outcome<Comparison> {
        info!(old = %old.short(), new = %new.short(), "comparing references");
        let vcs = self.vcs.as_ref();
        let cache = self.cache.as_ref();
        let pipeline = &self.config.pipeline;

        let outcome = with_isolated_workspace(vcs, source, |ws| {
            let repo = ws.path();
            vcs.checkout(repo, new)?;
            let new_stages = load_stages(repo, &pipeline.spec_file, &pipeline.code_suffix)?;
            vcs.checkout(repo, old)?;
            let old_stages = self.stages_at_old(repo)?;
            let stages = merge_stages(new_stages, old_stages);

            let old_area = materialize(vcs, cache, repo, old, &stages)?;
            let new_area = materialize(vcs, cache, repo, new, &stages)?;
            Ok(compare_stages(
                vcs,
                repo,
                &stages,
                &old_area,
                &new_area,
                &self.config.risk,
            ))
        });

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                error!(old = %old, new = %new, error = %e, "comparison failed");
                return Err(e);
            }
        };

        let report_path = report::persist(&result, output_dir, new)?;
        Ok(Comparison {
            old: old.clone(),
            new: new.clone(),
            summary: ComparisonSummary::from_result(&result),
            result,
            report_path,
        })
    }

    /// The baseline may predate the pipeline file; it then declares no stages.
    fn stages_at_old(&self, repo: &Path) -> Outcome<Vec<StageSpec>> {
        let pipeline = &self.config.pipeline;
        match load_stages(repo, &pipeline.spec_file, &pipeline.code_suffix) {
            Err(DriftError::SpecNotFound(path)) => {
                debug!(path = %path.display(), "no pipeline file at the baseline");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    /// Compare the head commits of two branches.
    ///
    /// Both names are resolved to commits before anything is checked out,
    /// so `HEAD` means the head of `source`.
    ///
    /// # Errors
    ///
    /// Fails if either branch does not resolve, or as
    /// [`Comparator::compare_references`] does.
    pub fn compare_branches(
        &self,
        source: &Path,
        old_branch: &str,
        new_branch: &str,
        output_dir: &Path,
    ) -> Outcome<Comparison> {
        let vcs = self.vcs.as_ref();
        let (old, new) = with_isolated_workspace(vcs, source, |ws| {
            Ok((
                vcs.resolve(ws.path(), old_branch)?,
                vcs.resolve(ws.path(), new_branch)?,
            ))
        })
        .inspect_err(|e| {
            error!(old = old_branch, new = new_branch, error = %e, "could not resolve branches");
        })?;

        info!(
            old_branch,
            old = %old.short(),
            new_branch,
            new = %new.short(),
            "resolved branch heads"
        );
        self.compare_references(source, &old, &new, output_dir)
    }

    /// Compare each consecutive pair among the last `count` commits.
    ///
    /// Pairs run oldest first and each writes its own report. A pair that
    /// fails is logged and skipped.
    ///
    /// # Errors
    ///
    /// Fails only if the commit list itself cannot be read.
    pub fn compare_history(
        &self,
        source: &Path,
        count: usize,
        output_dir: &Path,
    ) -> Outcome<Vec<Comparison>> {
        let vcs = self.vcs.as_ref();
        let commits = with_isolated_workspace(vcs, source, |ws| vcs.recent_commits(ws.path(), count))?;
        if commits.len() < 2 {
            warn!(found = commits.len(), "need at least two commits to compare");
            return Ok(Vec::new());
        }

        let mut comparisons = Vec::with_capacity(commits.len() - 1);
        for pair in commits.windows(2) {
            match self.compare_references(source, &pair[0], &pair[1], output_dir) {
                Ok(comparison) => comparisons.push(comparison),
                Err(e) => warn!(new = %pair[1].short(), error = %e, "skipping commit"),
            }
        }
        Ok(comparisons)
    }
}
