use std::path::{Path, PathBuf};

use stagedrift_core::{ComparisonResult, Outcome, Reference};
use tracing::info;

/// Write `result` to `<output_dir>/<new_ref>.json`, creating the directory.
///
/// An existing report for the same reference is overwritten.
///
/// # Errors
///
/// Returns [`stagedrift_core::DriftError::Io`] if the directory or file
/// cannot be written.
///
/// # Examples
///
/// ```
/// use stagedrift_core::{ComparisonResult, FileMetric, Reference};
/// use stagedrift_engine::report::{load, persist};
///
/// let dir = tempfile::tempdir().unwrap();
/// let mut result = ComparisonResult::default();
/// result.insert("train", "data/train.csv", FileMetric::Risk(0.18));
///
/// let path = persist(&result, &dir.path().join("output"), &Reference::from("abc123")).unwrap();
/// assert!(path.ends_with("output/abc123.json"));
/// assert_eq!(load(&path).unwrap(), result);
/// ```
pub fn persist(result: &ComparisonResult, output_dir: &Path, new_ref: &Reference) -> Outcome<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("{}.json", report_name(new_ref)));
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(&path, json)?;
    info!(report = %path.display(), "report written");
    Ok(path)
}

/// Read a persisted report back.
///
/// # Errors
///
/// Returns [`stagedrift_core::DriftError::Io`] if the file cannot be read, or
/// [`stagedrift_core::DriftError::Serialization`] if it is not a report.
pub fn load(path: &Path) -> Outcome<ComparisonResult> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Branch names may contain `/`; keep the report a single file.
fn report_name(reference: &Reference) -> String {
    reference.as_str().replace(['/', '\\'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagedrift_core::{CodeDiffStat, DriftError, FileMetric};

    fn sample() -> ComparisonResult {
        let mut result = ComparisonResult::default();
        result.insert("stage1", "file1.csv", FileMetric::Risk(0.5));
        result.insert(
            "stage1",
            "script.py",
            FileMetric::Code(CodeDiffStat {
                added: 10,
                deleted: 5,
                file: "script.py".into(),
            }),
        );
        result
    }

    #[test]
    fn report_is_pretty_json_named_by_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = persist(&sample(), dir.path(), &Reference::from("abc123")).unwrap();
        assert_eq!(path, dir.path().join("abc123.json"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["stage1"]["file1.csv"], 0.5);
        assert_eq!(value["stage1"]["script.py"]["added"], 10);
    }

    #[test]
    fn rerun_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        persist(&sample(), dir.path(), &Reference::from("abc")).unwrap();
        let empty = ComparisonResult::default();
        let path = persist(&empty, dir.path(), &Reference::from("abc")).unwrap();
        assert_eq!(load(&path).unwrap(), empty);
    }

    #[test]
    fn slashes_in_branch_names_are_flattened() {
        let dir = tempfile::tempdir().unwrap();
        let path = persist(&sample(), dir.path(), &Reference::from("feature/x")).unwrap();
        assert_eq!(path, dir.path().join("feature_x.json"));
    }

    #[test]
    fn loading_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(load(&path), Err(DriftError::Serialization(_))));
    }
}
