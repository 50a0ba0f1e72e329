use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DriftError;

/// An identifier the version-control provider resolves to an immutable tree.
///
/// Either a commit hash or a branch name. Branch names are resolved to their
/// head commit before a comparison starts.
///
/// # Examples
///
/// ```
/// use stagedrift_core::Reference;
///
/// let r = Reference::from("0123456789abcdef");
/// assert_eq!(r.as_str(), "0123456789abcdef");
/// assert_eq!(r.short(), "01234567");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(String);

impl Reference {
    /// Wrap a raw reference string.
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// The raw reference string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map_or(self.0.len(), |(idx, _)| idx);
        &self.0[..end]
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Reference {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Reference {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One stage of the data pipeline.
///
/// `deps` and `deps_py` partition the stage's raw dependency list: a
/// dependency is code iff its path ends with the configured source suffix.
///
/// # Examples
///
/// ```
/// use stagedrift_core::StageSpec;
///
/// let stage = StageSpec {
///     name: "train".into(),
///     deps: vec!["data/train.csv".into()],
///     deps_py: vec!["src/train.py".into()],
///     outs: vec!["model/metrics.json".into()],
/// };
/// assert_eq!(stage.data_paths(), vec!["data/train.csv", "model/metrics.json"]);
/// assert_eq!(stage.all_paths().len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Stage name as declared in the pipeline file.
    pub name: String,
    /// Non-code input paths.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,
    /// Code input paths.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps_py: Vec<String>,
    /// Output paths.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outs: Vec<String>,
}

impl StageSpec {
    /// Data dependencies followed by outputs, de-duplicated, in declaration order.
    pub fn data_paths(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for path in self.deps.iter().chain(&self.outs) {
            if !seen.contains(&path.as_str()) {
                seen.push(path.as_str());
            }
        }
        seen
    }

    /// Every declared path: data dependencies, outputs and code dependencies.
    pub fn all_paths(&self) -> Vec<&str> {
        let mut paths = self.data_paths();
        for path in &self.deps_py {
            if !paths.contains(&path.as_str()) {
                paths.push(path.as_str());
            }
        }
        paths
    }
}

/// Weights of the four drift components.
///
/// # Examples
///
/// ```
/// use stagedrift_core::RiskWeights;
///
/// let w = RiskWeights::default();
/// assert_eq!(w.duplicates, 0.4);
/// assert!(w.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskWeights {
    /// Weight of the relative row-count change.
    #[serde(default = "default_rows_weight")]
    pub rows: f64,
    /// Weight of the relative column-count change.
    #[serde(default = "default_columns_weight")]
    pub columns: f64,
    /// Weight of the duplicate-count change.
    #[serde(default = "default_duplicates_weight")]
    pub duplicates: f64,
    /// Weight of the null-count change.
    #[serde(default = "default_nulls_weight")]
    pub nulls: f64,
}

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

fn default_rows_weight() -> f64 {
    0.2
}

fn default_columns_weight() -> f64 {
    0.2
}

fn default_duplicates_weight() -> f64 {
    0.4
}

fn default_nulls_weight() -> f64 {
    0.2
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            rows: default_rows_weight(),
            columns: default_columns_weight(),
            duplicates: default_duplicates_weight(),
            nulls: default_nulls_weight(),
        }
    }
}

impl RiskWeights {
    /// Check that every weight is a non-negative finite number and that they sum to 1.
    ///
    /// # Errors
    ///
    /// Returns [`DriftError::Config`] describing the offending weights.
    pub fn validate(&self) -> Result<(), DriftError> {
        let parts = [
            ("rows", self.rows),
            ("columns", self.columns),
            ("duplicates", self.duplicates),
            ("nulls", self.nulls),
        ];
        for (name, value) in parts {
            if !value.is_finite() || value < 0.0 {
                return Err(DriftError::Config(format!(
                    "risk weight '{name}' must be a non-negative number, got {value}"
                )));
            }
        }
        let sum: f64 = parts.iter().map(|(_, v)| v).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(DriftError::Config(format!(
                "risk weights must sum to 1, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Line churn of one code dependency between two references.
///
/// # Examples
///
/// ```
/// use stagedrift_core::CodeDiffStat;
///
/// let stat = CodeDiffStat::unchanged("src/train.py");
/// assert_eq!((stat.added, stat.deleted), (0, 0));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeDiffStat {
    /// Lines added.
    pub added: u64,
    /// Lines deleted.
    pub deleted: u64,
    /// Path the numbers refer to.
    pub file: String,
}

impl CodeDiffStat {
    /// A stat for a file with no changes in range.
    pub fn unchanged(file: impl Into<String>) -> Self {
        Self {
            added: 0,
            deleted: 0,
            file: file.into(),
        }
    }
}

/// The metric recorded for one file of a stage.
///
/// Serialized untagged: a data file is a bare number, a code file is
/// `{"added", "deleted", "file"}`, an unavailable diff is `{"error"}`.
///
/// # Examples
///
/// ```
/// use stagedrift_core::{CodeDiffStat, FileMetric};
///
/// let json = serde_json::to_string(&FileMetric::Risk(0.18)).unwrap();
/// assert_eq!(json, "0.18");
///
/// let code = FileMetric::Code(CodeDiffStat { added: 3, deleted: 1, file: "x.py".into() });
/// assert_eq!(code.risk(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileMetric {
    /// Drift risk of a data dependency or output.
    Risk(f64),
    /// Line churn of a code dependency.
    Code(CodeDiffStat),
    /// The code diff could not be computed.
    Failed {
        /// Reason reported by the provider.
        error: String,
    },
}

impl FileMetric {
    /// The risk value, if this is a data entry.
    pub fn risk(&self) -> Option<f64> {
        match self {
            FileMetric::Risk(q) => Some(*q),
            _ => None,
        }
    }

    /// The line churn, if this is a code entry.
    pub fn code(&self) -> Option<&CodeDiffStat> {
        match self {
            FileMetric::Code(stat) => Some(stat),
            _ => None,
        }
    }
}

/// Per-stage, per-file metrics of one comparison.
///
/// # Examples
///
/// ```
/// use stagedrift_core::{ComparisonResult, FileMetric};
///
/// let mut result = ComparisonResult::default();
/// result.insert("prepare", "data/raw.csv", FileMetric::Risk(0.0));
/// assert_eq!(result.stage("prepare").map(|s| s.len()), Some(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComparisonResult(BTreeMap<String, BTreeMap<String, FileMetric>>);

impl ComparisonResult {
    /// Record `metric` for `path` in `stage`. A later insert for the same path wins.
    pub fn insert(&mut self, stage: &str, path: &str, metric: FileMetric) {
        self.0
            .entry(stage.to_string())
            .or_default()
            .insert(path.to_string(), metric);
    }

    /// Ensure `stage` is present, even with no files.
    pub fn ensure_stage(&mut self, stage: &str) {
        self.0.entry(stage.to_string()).or_default();
    }

    /// Entries of one stage.
    pub fn stage(&self, name: &str) -> Option<&BTreeMap<String, FileMetric>> {
        self.0.get(name)
    }

    /// Iterate stages in name order.
    pub fn stages(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, FileMetric>)> {
        self.0.iter()
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no stage was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use stagedrift_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables and summaries.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
