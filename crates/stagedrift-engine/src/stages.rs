use std::path::Path;

use serde_yaml::Value;
use stagedrift_core::{DriftError, Outcome, StageSpec};
use tracing::debug;

/// Read the stage graph from `<root>/<spec_file>`.
///
/// Stages keep the order they are declared in. Dependencies whose path ends
/// with `code_suffix` land in [`StageSpec::deps_py`]; the rest stay in
/// [`StageSpec::deps`].
///
/// # Errors
///
/// Returns [`DriftError::SpecNotFound`] if the file does not exist, or
/// [`DriftError::SpecMalformed`] if it is not YAML with a `stages` mapping.
pub fn load_stages(root: &Path, spec_file: &str, code_suffix: &str) -> Outcome<Vec<StageSpec>> {
    let path = root.join(spec_file);
    if !path.is_file() {
        return Err(DriftError::SpecNotFound(path));
    }
    let content = std::fs::read_to_string(&path)?;
    let stages = parse_stages(&content, code_suffix)
        .map_err(|detail| DriftError::SpecMalformed { path, detail })?;
    debug!(count = stages.len(), "pipeline stages loaded");
    Ok(stages)
}

/// Parse pipeline YAML text into stages.
///
/// # Examples
///
/// ```
/// use stagedrift_engine::stages::parse_stages;
///
/// let yaml = "
/// stages:
///   prepare:
///     cmd: python prepare.py
///     deps:
///       - data/raw.csv
///       - prepare.py
///     outs:
///       - data/clean.csv
/// ";
/// let stages = parse_stages(yaml, ".py").unwrap();
/// assert_eq!(stages[0].name, "prepare");
/// assert_eq!(stages[0].deps, vec!["data/raw.csv"]);
/// assert_eq!(stages[0].deps_py, vec!["prepare.py"]);
/// assert_eq!(stages[0].outs, vec!["data/clean.csv"]);
/// ```
pub fn parse_stages(content: &str, code_suffix: &str) -> Result<Vec<StageSpec>, String> {
    let doc: Value = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
    let stages = doc
        .get("stages")
        .and_then(Value::as_mapping)
        .ok_or_else(|| "missing 'stages' mapping".to_string())?;

    stages
        .iter()
        .map(|(name, body)| {
            let name = scalar(name).ok_or_else(|| format!("invalid stage name: {name:?}"))?;
            let deps = path_list(body, "deps").map_err(|e| format!("stage '{name}': {e}"))?;
            let outs = path_list(body, "outs").map_err(|e| format!("stage '{name}': {e}"))?;
            let (deps, deps_py) = partition_dependencies(deps, code_suffix);
            Ok(StageSpec {
                name,
                deps,
                deps_py,
                outs,
            })
        })
        .collect()
}

/// Split raw dependencies into `(data, code)` by path suffix, keeping order.
///
/// # Examples
///
/// ```
/// use stagedrift_engine::stages::partition_dependencies;
///
/// let raw = vec!["data.csv".to_string(), "script.py".to_string()];
/// let (data, code) = partition_dependencies(raw, ".py");
/// assert_eq!(data, vec!["data.csv"]);
/// assert_eq!(code, vec!["script.py"]);
/// ```
pub fn partition_dependencies(raw: Vec<String>, code_suffix: &str) -> (Vec<String>, Vec<String>) {
    raw.into_iter().partition(|dep| !dep.ends_with(code_suffix))
}

/// Union of the stage graphs declared at two references.
///
/// Stages keep the order of `primary`, followed by stages only `secondary`
/// declares. A stage declared at both gets every path either side lists,
/// so a path dropped at one reference still reaches the comparison.
///
/// # Examples
///
/// ```
/// use stagedrift_engine::stages::{merge_stages, parse_stages};
///
/// let new = parse_stages("stages:\n  keep:\n    outs: [a.csv]\n", ".py").unwrap();
/// let old = parse_stages(
///     "stages:\n  keep:\n    outs: [a.csv, b.csv]\n  legacy:\n    outs: [old.csv]\n",
///     ".py",
/// )
/// .unwrap();
///
/// let merged = merge_stages(new, old);
/// assert_eq!(merged.len(), 2);
/// assert_eq!(merged[0].outs, vec!["a.csv", "b.csv"]);
/// assert_eq!(merged[1].name, "legacy");
/// ```
pub fn merge_stages(primary: Vec<StageSpec>, secondary: Vec<StageSpec>) -> Vec<StageSpec> {
    let mut merged = primary;
    for extra in secondary {
        match merged.iter_mut().find(|stage| stage.name == extra.name) {
            Some(stage) => {
                extend_unique(&mut stage.deps, extra.deps);
                extend_unique(&mut stage.deps_py, extra.deps_py);
                extend_unique(&mut stage.outs, extra.outs);
            }
            None => merged.push(extra),
        }
    }
    merged
}

fn extend_unique(paths: &mut Vec<String>, extra: Vec<String>) {
    for path in extra {
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Entries are plain paths or single-key maps such as `- model.pkl: {cache: false}`.
fn path_list(body: &Value, key: &str) -> Result<Vec<String>, String> {
    let Some(entries) = body.get(key) else {
        return Ok(Vec::new());
    };
    let entries = match entries {
        Value::Null => return Ok(Vec::new()),
        Value::Sequence(entries) => entries,
        other => return Err(format!("'{key}' must be a list, got {other:?}")),
    };

    entries
        .iter()
        .map(|entry| match entry {
            Value::Mapping(map) if map.len() == 1 => map
                .keys()
                .next()
                .and_then(scalar)
                .ok_or_else(|| format!("invalid '{key}' entry: {entry:?}")),
            other => scalar(other).ok_or_else(|| format!("invalid '{key}' entry: {other:?}")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deps_are_partitioned_by_suffix() {
        let yaml = "stages:\n  s:\n    deps: [data.csv, script.py]\n";
        let stages = parse_stages(yaml, ".py").unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].deps, vec!["data.csv"]);
        assert_eq!(stages[0].deps_py, vec!["script.py"]);
        assert!(stages[0].outs.is_empty());
    }

    #[test]
    fn declaration_order_is_kept() {
        let yaml = "stages:\n  zeta: {}\n  alpha: {}\n  mid: {}\n";
        let names: Vec<String> = parse_stages(yaml, ".py")
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn stage_without_deps_or_outs_is_empty() {
        let yaml = "stages:\n  report:\n    cmd: echo done\n";
        let stage = &parse_stages(yaml, ".py").unwrap()[0];
        assert!(stage.deps.is_empty() && stage.deps_py.is_empty() && stage.outs.is_empty());
    }

    #[test]
    fn mapped_outs_use_their_key() {
        let yaml = "\
stages:
  train:
    deps:
      - train.py
    outs:
      - model.pkl:
          cache: false
      - metrics.json
";
        let stage = &parse_stages(yaml, ".py").unwrap()[0];
        assert_eq!(stage.outs, vec!["model.pkl", "metrics.json"]);
        assert_eq!(stage.deps_py, vec!["train.py"]);
    }

    #[test]
    fn merge_keeps_stages_and_paths_from_both_sides() {
        let new = parse_stages(
            "stages:\n  prepare:\n    deps: [raw.csv, prep.py]\n    outs: [clean.csv]\n",
            ".py",
        )
        .unwrap();
        let old = parse_stages(
            "stages:\n  legacy:\n    outs: [old.csv]\n  prepare:\n    deps: [raw.csv, old_prep.py]\n    outs: [clean.csv, extra.csv]\n",
            ".py",
        )
        .unwrap();

        let merged = merge_stages(new, old);
        let names: Vec<&str> = merged.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["prepare", "legacy"]);
        assert_eq!(merged[0].deps, vec!["raw.csv"]);
        assert_eq!(merged[0].deps_py, vec!["prep.py", "old_prep.py"]);
        assert_eq!(merged[0].outs, vec!["clean.csv", "extra.csv"]);
        assert_eq!(merged[1].outs, vec!["old.csv"]);
    }

    #[test]
    fn merge_with_nothing_is_identity() {
        let stages = parse_stages("stages:\n  a:\n    outs: [x.csv]\n", ".py").unwrap();
        assert_eq!(merge_stages(stages.clone(), Vec::new()), stages);
        assert_eq!(merge_stages(Vec::new(), stages.clone()), stages);
    }

    #[test]
    fn custom_suffix() {
        let yaml = "stages:\n  s:\n    deps: [analysis.R, data.csv, helper.py]\n";
        let stage = &parse_stages(yaml, ".R").unwrap()[0];
        assert_eq!(stage.deps_py, vec!["analysis.R"]);
        assert_eq!(stage.deps, vec!["data.csv", "helper.py"]);
    }

    #[test]
    fn missing_stages_key_is_malformed() {
        assert!(parse_stages("vars: []\n", ".py").is_err());
        assert!(parse_stages("stages: [a, b]\n", ".py").is_err());
    }

    #[test]
    fn bad_yaml_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dvc.yaml"), "stages: {unclosed").unwrap();
        let err = load_stages(dir.path(), "dvc.yaml", ".py").unwrap_err();
        assert!(matches!(err, DriftError::SpecMalformed { .. }));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_stages(dir.path(), "dvc.yaml", ".py").unwrap_err();
        assert!(matches!(err, DriftError::SpecNotFound(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("dvc.yaml"),
            "stages:\n  s:\n    deps: [a.csv, x.py]\n    outs: [b.csv]\n",
        )
        .unwrap();
        let stages = load_stages(dir.path(), "dvc.yaml", ".py").unwrap();
        assert_eq!(stages[0].data_paths(), vec!["a.csv", "b.csv"]);
    }
}
