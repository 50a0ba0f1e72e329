use std::collections::BTreeSet;
use std::path::Path;

use stagedrift_core::{ComparisonResult, FileMetric, RiskWeights, StageSpec};
use stagedrift_tabular::{load_or_empty, risk_breakdown};
use stagedrift_vcs::{code_diff_stats, VersionControl};
use tracing::{debug, warn};

use crate::snapshot::HoldingArea;

/// Score every declared path of every stage between two holding areas.
///
/// Data dependencies and outputs get a drift risk. A declared directory is
/// expanded to the union of the files it contains on either side. Code
/// dependencies get line churn from the provider, run in `repo`, or a
/// [`FileMetric::Failed`] marker when the diff is unavailable. A file that
/// fails to parse scores 0. Nothing here aborts the comparison.
pub fn compare_stages(
    vcs: &dyn VersionControl,
    repo: &Path,
    stages: &[StageSpec],
    old: &HoldingArea,
    new: &HoldingArea,
    weights: &RiskWeights,
) -> ComparisonResult {
    let mut result = ComparisonResult::default();

    for stage in stages {
        result.ensure_stage(&stage.name);

        for declared in stage.data_paths() {
            for entry in data_entries(declared, old, new) {
                let score = file_risk(&entry, old, new, weights);
                result.insert(&stage.name, &entry, FileMetric::Risk(score));
            }
        }

        for code in &stage.deps_py {
            let metric = match code_diff_stats(vcs, repo, code, old.reference(), new.reference())
            {
                Ok(stat) => FileMetric::Code(stat),
                Err(e) => {
                    warn!(stage = %stage.name, path = %code, error = %e, "code diff unavailable");
                    FileMetric::Failed {
                        error: e.to_string(),
                    }
                }
            };
            result.insert(&stage.name, code, metric);
        }
    }

    result
}

/// Entries reported for one declared path.
fn data_entries(declared: &str, old: &HoldingArea, new: &HoldingArea) -> Vec<String> {
    let is_dir = [old, new]
        .iter()
        .any(|area| area.root().join(declared).is_dir());
    if !is_dir {
        return vec![declared.to_string()];
    }
    let files: BTreeSet<String> = old
        .files_under(declared)
        .into_iter()
        .chain(new.files_under(declared))
        .collect();
    if files.is_empty() {
        return vec![declared.to_string()];
    }
    files.into_iter().collect()
}

fn file_risk(entry: &str, old: &HoldingArea, new: &HoldingArea, weights: &RiskWeights) -> f64 {
    let load = |area: &HoldingArea| {
        let path = area.resolve(entry).filter(|p| p.is_file());
        load_or_empty(path.as_deref())
    };
    match (load(old), load(new)) {
        (Ok(before), Ok(after)) => {
            let breakdown = risk_breakdown(&before, &after, weights);
            debug!(
                path = entry,
                rows = breakdown.rows_delta,
                columns = breakdown.columns_delta,
                duplicates = breakdown.duplicates_delta,
                nulls = breakdown.nulls_delta,
                score = breakdown.score,
                "drift risk"
            );
            breakdown.score
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!(path = entry, error = %e, "could not load table, scoring 0");
            0.0
        }
    }
}
