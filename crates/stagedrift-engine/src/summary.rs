use std::fmt;

use serde::Serialize;
use stagedrift_core::{ComparisonResult, FileMetric};
use stagedrift_tabular::RiskLevel;

/// Roll-up of one stage's entries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSummary {
    /// Stage name.
    pub name: String,
    /// Mean risk of the stage's data entries, `None` without any.
    pub mean_risk: Option<f64>,
    /// Highest single-file risk in the stage.
    pub max_risk: Option<f64>,
    /// Number of scored data files.
    pub data_files: usize,
    /// Lines added across code dependencies.
    pub code_added: u64,
    /// Lines deleted across code dependencies.
    pub code_deleted: u64,
    /// Code dependencies whose diff could not be computed.
    pub failed_diffs: usize,
    /// Classification of `mean_risk`.
    pub level: RiskLevel,
}

/// Per-stage and overall view of a [`ComparisonResult`].
///
/// The overall risk is the mean of the stage means, over stages that have
/// at least one data entry.
///
/// # Examples
///
/// ```
/// use stagedrift_core::{ComparisonResult, FileMetric};
/// use stagedrift_engine::summary::ComparisonSummary;
/// use stagedrift_tabular::RiskLevel;
///
/// let mut result = ComparisonResult::default();
/// result.insert("prepare", "a.csv", FileMetric::Risk(0.1));
/// result.insert("prepare", "b.csv", FileMetric::Risk(0.3));
/// result.insert("train", "c.csv", FileMetric::Risk(0.6));
///
/// let summary = ComparisonSummary::from_result(&result);
/// assert_eq!(summary.riskiest_stage.as_deref(), Some("train"));
/// assert!((summary.overall_risk.unwrap() - 0.4).abs() < 1e-9);
/// assert_eq!(summary.level, RiskLevel::High);
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSummary {
    /// Stages in name order.
    pub stages: Vec<StageSummary>,
    /// Mean of the stage means.
    pub overall_risk: Option<f64>,
    /// Stage with the highest mean risk.
    pub riskiest_stage: Option<String>,
    /// Classification of `overall_risk`.
    pub level: RiskLevel,
    /// Lines added across all code dependencies.
    pub code_added: u64,
    /// Lines deleted across all code dependencies.
    pub code_deleted: u64,
}

impl ComparisonSummary {
    /// Summarize a comparison result.
    pub fn from_result(result: &ComparisonResult) -> Self {
        let stages: Vec<StageSummary> = result
            .stages()
            .map(|(name, entries)| {
                let risks: Vec<f64> = entries.values().filter_map(FileMetric::risk).collect();
                let mean_risk = mean(&risks);
                let max_risk = risks.iter().copied().reduce(f64::max);
                let (code_added, code_deleted) = entries
                    .values()
                    .filter_map(FileMetric::code)
                    .fold((0, 0), |(a, d), stat| (a + stat.added, d + stat.deleted));
                let failed_diffs = entries
                    .values()
                    .filter(|m| matches!(m, FileMetric::Failed { .. }))
                    .count();
                StageSummary {
                    name: name.clone(),
                    mean_risk,
                    max_risk,
                    data_files: risks.len(),
                    code_added,
                    code_deleted,
                    failed_diffs,
                    level: RiskLevel::from_score(mean_risk.unwrap_or(0.0)),
                }
            })
            .collect();

        let means: Vec<f64> = stages.iter().filter_map(|s| s.mean_risk).collect();
        let overall_risk = mean(&means);
        let riskiest_stage = stages
            .iter()
            .filter_map(|s| s.mean_risk.map(|m| (s, m)))
            .fold(None::<(&StageSummary, f64)>, |best, (s, m)| match best {
                Some((_, top)) if top >= m => best,
                _ => Some((s, m)),
            })
            .map(|(s, _)| s.name.clone());

        Self {
            code_added: stages.iter().map(|s| s.code_added).sum(),
            code_deleted: stages.iter().map(|s| s.code_deleted).sum(),
            level: RiskLevel::from_score(overall_risk.unwrap_or(0.0)),
            stages,
            overall_risk,
            riskiest_stage,
        }
    }

    /// Render the summary as a markdown string.
    ///
    /// # Examples
    ///
    /// ```
    /// use stagedrift_core::ComparisonResult;
    /// use stagedrift_engine::summary::ComparisonSummary;
    ///
    /// let md = ComparisonSummary::from_result(&ComparisonResult::default()).to_markdown();
    /// assert!(md.contains("# Drift Report"));
    /// ```
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Drift Report\n\n");
        out.push_str(&format!(
            "**Overall Risk:** {} ({})\n\n",
            fmt_risk(self.overall_risk),
            self.level
        ));

        if !self.stages.is_empty() {
            out.push_str("| Stage | Files | Mean Risk | Max Risk | Level | Code +/- |\n");
            out.push_str("|-------|-------|-----------|----------|-------|----------|\n");
            for s in &self.stages {
                out.push_str(&format!(
                    "| {} | {} | {} | {} | {} | +{}/-{} |\n",
                    s.name,
                    s.data_files,
                    fmt_risk(s.mean_risk),
                    fmt_risk(s.max_risk),
                    s.level,
                    s.code_added,
                    s.code_deleted,
                ));
            }
            out.push('\n');
        }

        if let Some(stage) = &self.riskiest_stage {
            out.push_str(&format!("**Riskiest stage:** {stage}\n\n"));
        }
        out.push_str(&format!(
            "**Summary:** {} stages, +{} code additions, -{} code deletions\n",
            self.stages.len(),
            self.code_added,
            self.code_deleted
        ));
        out
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn fmt_risk(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

impl fmt::Display for ComparisonSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Drift Report")?;
        writeln!(f, "============")?;
        writeln!(
            f,
            "Overall Risk: {} ({})\n",
            fmt_risk(self.overall_risk),
            self.level
        )?;

        if !self.stages.is_empty() {
            writeln!(
                f,
                "{:<30} {:>6} {:>10} {:>10} {:>9} {:>12}",
                "Stage", "Files", "Mean", "Max", "Level", "Code +/-"
            )?;
            writeln!(f, "{}", "-".repeat(82))?;
            for s in &self.stages {
                let failed = if s.failed_diffs > 0 {
                    format!("  ({} diff unavailable)", s.failed_diffs)
                } else {
                    String::new()
                };
                writeln!(
                    f,
                    "{:<30} {:>6} {:>10} {:>10} {:>9} {:>+6}/{:<-5}{}",
                    s.name,
                    s.data_files,
                    fmt_risk(s.mean_risk),
                    fmt_risk(s.max_risk),
                    s.level,
                    s.code_added,
                    s.code_deleted,
                    failed,
                )?;
            }
        }

        if let Some(stage) = &self.riskiest_stage {
            writeln!(f, "\nRiskiest stage: {stage}")?;
        }
        writeln!(
            f,
            "\nSummary: {} stages, +{} code additions, -{} code deletions",
            self.stages.len(),
            self.code_added,
            self.code_deleted
        )
    }
}
