use std::path::Path;

use stagedrift_core::{CodeDiffStat, DriftError, Outcome, Reference};
use tracing::debug;

use crate::git::VersionControl;

/// Parse `git diff --numstat` output into one [`CodeDiffStat`] for `file`.
///
/// Every line is summed, so a directory path covering several files gets
/// their total. Binary files report `-` and add nothing.
///
/// # Examples
///
/// ```
/// use stagedrift_vcs::numstat::parse_numstat;
///
/// let stat = parse_numstat("10\t5\tsrc/train.py\n", "src/train.py");
/// assert_eq!((stat.added, stat.deleted), (10, 5));
///
/// let unchanged = parse_numstat("", "src/train.py");
/// assert_eq!((unchanged.added, unchanged.deleted), (0, 0));
/// ```
pub fn parse_numstat(output: &str, file: &str) -> CodeDiffStat {
    let mut stat = CodeDiffStat::unchanged(file);
    for line in output.lines() {
        let mut fields = line.split('\t');
        let (Some(added), Some(deleted)) = (fields.next(), fields.next()) else {
            continue;
        };
        stat.added += added.trim().parse::<u64>().unwrap_or(0);
        stat.deleted += deleted.trim().parse::<u64>().unwrap_or(0);
    }
    stat
}

/// Line churn of `path` between `old` and `new` in `repo`.
///
/// # Errors
///
/// Any provider failure is reported as [`DriftError::DiffUnavailable`] so the
/// caller can record it against this one file.
pub fn code_diff_stats(
    vcs: &dyn VersionControl,
    repo: &Path,
    path: &str,
    old: &Reference,
    new: &Reference,
) -> Outcome<CodeDiffStat> {
    let output = vcs
        .diff_numstat(repo, old, new, path)
        .map_err(|e| DriftError::DiffUnavailable {
            path: path.to_string(),
            detail: e.to_string(),
        })?;
    let stat = parse_numstat(&output, path);
    debug!(path, added = stat.added, deleted = stat.deleted, "code diff");
    Ok(stat)
}
