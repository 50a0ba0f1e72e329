use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use stagedrift_core::RiskWeights;

use crate::matrix::{Cell, TabularMatrix};

/// The four relative deltas behind a drift risk score, plus the score.
///
/// # Examples
///
/// ```
/// use stagedrift_core::RiskWeights;
/// use stagedrift_tabular::matrix::{Cell, TabularMatrix};
/// use stagedrift_tabular::risk::risk_breakdown;
///
/// let old = TabularMatrix::from_rows(vec![vec![Cell::Number(1.0)], vec![Cell::Number(1.0)]]);
/// let new = TabularMatrix::from_rows(vec![vec![Cell::Number(1.0)]]);
/// let b = risk_breakdown(&old, &new, &RiskWeights::default());
/// assert_eq!(b.rows_delta, -0.5);
/// assert_eq!(b.duplicates_delta, -0.5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskBreakdown {
    /// `(Rt − R0) / R0`, or 0 when the old side has no rows.
    pub rows_delta: f64,
    /// `(Ct − C0) / C0`, or 0 when the old side has no columns.
    pub columns_delta: f64,
    /// `(Dt − D0) / R0`, or 0 when the old side has no rows.
    pub duplicates_delta: f64,
    /// `(Nt − N0) / (R0 · C0)`, or 0 when the old side has no cells.
    pub nulls_delta: f64,
    /// Duplicate counts `(D0, Dt)`.
    pub duplicates: (usize, usize),
    /// Null counts `(N0, Nt)`.
    pub nulls: (usize, usize),
    /// Weighted sum of the absolute deltas.
    pub score: f64,
}

/// Duplicate count of a matrix: over numeric columns only, the number of
/// cells minus the number of distinct values.
///
/// Missing values count as one distinct value per column, and `-0.0`
/// equals `0.0`.
///
/// # Examples
///
/// ```
/// use stagedrift_tabular::matrix::{Cell, TabularMatrix};
/// use stagedrift_tabular::risk::duplicate_count;
///
/// let m = TabularMatrix::from_rows(vec![
///     vec![Cell::Number(1.0), Cell::Text("x".into())],
///     vec![Cell::Number(1.0), Cell::Text("x".into())],
///     vec![Cell::Missing, Cell::Text("y".into())],
///     vec![Cell::Missing, Cell::Text("y".into())],
/// ]);
/// // text column ignored; numeric column has {1, missing}
/// assert_eq!(duplicate_count(&m), 2);
/// ```
pub fn duplicate_count(matrix: &TabularMatrix) -> usize {
    let (rows, columns) = matrix.shape();
    (0..columns)
        .filter(|idx| matrix.is_numeric_column(*idx))
        .map(|idx| {
            let distinct: HashSet<Option<u64>> = matrix.column(idx).map(distinct_key).collect();
            rows - distinct.len()
        })
        .sum()
}

/// Null count of a matrix: missing or NaN cells in numeric columns only.
pub fn null_count(matrix: &TabularMatrix) -> usize {
    (0..matrix.shape().1)
        .filter(|idx| matrix.is_numeric_column(*idx))
        .map(|idx| matrix.column(idx).filter(|c| c.is_missing()).count())
        .sum()
}

fn distinct_key(cell: &Cell) -> Option<u64> {
    match cell {
        Cell::Number(v) if v.is_nan() => None,
        // normalises -0.0
        Cell::Number(v) => Some((v + 0.0).to_bits()),
        Cell::Missing | Cell::Text(_) => None,
    }
}

fn guarded(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Compute the drift risk between two snapshots of a table with its deltas.
///
/// Duplicate and null accounting only looks at columns whose values are all
/// numeric (or missing). Text columns contribute nothing to `D` or `N`, even
/// when they hold duplicates or blanks. Each matrix is classified on its own
/// columns, so a column that turns textual on one side drops out of that
/// side's counts.
///
/// Every delta is 0 when its old-side denominator is 0, so a table that only
/// exists on the new side scores 0.
pub fn risk_breakdown(
    old: &TabularMatrix,
    new: &TabularMatrix,
    weights: &RiskWeights,
) -> RiskBreakdown {
    let (r0, c0) = old.shape();
    let (rt, ct) = new.shape();
    let (r0, c0, rt, ct) = (r0 as f64, c0 as f64, rt as f64, ct as f64);

    let duplicates = (duplicate_count(old), duplicate_count(new));
    let nulls = (null_count(old), null_count(new));
    let (d0, dt) = (duplicates.0 as f64, duplicates.1 as f64);
    let (n0, nt) = (nulls.0 as f64, nulls.1 as f64);

    let rows_delta = guarded(rt - r0, r0);
    let columns_delta = guarded(ct - c0, c0);
    let duplicates_delta = guarded(dt - d0, r0);
    let nulls_delta = guarded(nt - n0, r0 * c0);

    let score = weights.rows * rows_delta.abs()
        + weights.columns * columns_delta.abs()
        + weights.duplicates * duplicates_delta.abs()
        + weights.nulls * nulls_delta.abs();

    RiskBreakdown {
        rows_delta,
        columns_delta,
        duplicates_delta,
        nulls_delta,
        duplicates,
        nulls,
        score,
    }
}

/// Drift risk score `Q` between two snapshots of a table.
///
/// See [`risk_breakdown`] for the numeric-only duplicate and null rule.
///
/// # Examples
///
/// ```
/// use stagedrift_core::RiskWeights;
/// use stagedrift_tabular::matrix::{Cell, TabularMatrix};
/// use stagedrift_tabular::risk::risk;
///
/// let m = TabularMatrix::from_rows(vec![vec![Cell::Number(1.0), Cell::Number(2.0)]]);
/// assert_eq!(risk(&m, &m, &RiskWeights::default()), 0.0);
/// ```
pub fn risk(old: &TabularMatrix, new: &TabularMatrix, weights: &RiskWeights) -> f64 {
    risk_breakdown(old, new, weights).score
}

/// Categorical classification of a drift score.
///
/// # Examples
///
/// ```
/// use stagedrift_tabular::risk::RiskLevel;
///
/// let level = RiskLevel::from_score(0.18);
/// assert!(matches!(level, RiskLevel::Medium));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Score below 0.1.
    Low,
    /// Score below 0.3.
    Medium,
    /// Score below 0.7.
    High,
    /// Score of 0.7 or more.
    Critical,
}

impl RiskLevel {
    /// Map a drift score to a risk level.
    ///
    /// # Examples
    ///
    /// ```
    /// use stagedrift_tabular::risk::RiskLevel;
    ///
    /// assert_eq!(RiskLevel::from_score(0.05), RiskLevel::Low);
    /// assert_eq!(RiskLevel::from_score(0.1), RiskLevel::Medium);
    /// assert_eq!(RiskLevel::from_score(0.5), RiskLevel::High);
    /// assert_eq!(RiskLevel::from_score(1.2), RiskLevel::Critical);
    /// ```
    pub fn from_score(score: f64) -> Self {
        if score < 0.1 {
            RiskLevel::Low
        } else if score < 0.3 {
            RiskLevel::Medium
        } else if score < 0.7 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "Low"),
            RiskLevel::Medium => write!(f, "Medium"),
            RiskLevel::High => write!(f, "High"),
            RiskLevel::Critical => write!(f, "Critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> Cell {
        Cell::Number(v)
    }

    fn grid(values: &[&[f64]]) -> TabularMatrix {
        TabularMatrix::from_rows(
            values
                .iter()
                .map(|row| row.iter().copied().map(num).collect())
                .collect(),
        )
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn identical_matrices_carry_no_drift() {
        let m = TabularMatrix::from_rows(vec![
            vec![num(1.0), Cell::Text("a".into()), Cell::Missing],
            vec![num(1.0), Cell::Text("a".into()), num(2.0)],
        ]);
        let weights = [
            RiskWeights::default(),
            RiskWeights {
                rows: 0.7,
                columns: 0.1,
                duplicates: 0.1,
                nulls: 0.1,
            },
        ];
        for w in weights {
            assert_eq!(risk(&m, &m, &w), 0.0);
        }
    }

    #[test]
    fn changed_value_without_shape_change_scores_zero() {
        let old = grid(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let new = grid(&[&[1.0, 2.0], &[3.0, 5.0]]);
        assert_eq!(risk(&old, &new, &RiskWeights::default()), 0.0);
    }

    #[test]
    fn dropping_duplicate_rows() {
        let mut old_rows = Vec::new();
        for (i, v) in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 1.0, 2.0, 3.0]
            .into_iter()
            .enumerate()
        {
            old_rows.push(vec![Cell::Text(format!("name{i}")), num(v)]);
        }
        let new_rows = old_rows[..7].to_vec();
        let old = TabularMatrix::from_rows(old_rows);
        let new = TabularMatrix::from_rows(new_rows);

        let b = risk_breakdown(&old, &new, &RiskWeights::default());
        assert_eq!(b.duplicates, (3, 0));
        assert!(close(b.rows_delta, -0.3));
        assert!(close(b.duplicates_delta, -0.3));
        assert!(close(b.score, 0.18));
    }

    #[test]
    fn empty_old_side_scores_zero() {
        let new = grid(&[&[1.0], &[1.0], &[f64::NAN]]);
        let b = risk_breakdown(&TabularMatrix::empty(), &new, &RiskWeights::default());
        assert_eq!(b.rows_delta, 0.0);
        assert_eq!(b.columns_delta, 0.0);
        assert_eq!(b.duplicates_delta, 0.0);
        assert_eq!(b.nulls_delta, 0.0);
        assert_eq!(b.score, 0.0);
    }

    #[test]
    fn removed_table_is_full_row_and_column_loss() {
        let old = grid(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let score = risk(&old, &TabularMatrix::empty(), &RiskWeights::default());
        assert!(close(score, 0.4));
    }

    #[test]
    fn nulls_only_counted_in_numeric_columns() {
        let old = TabularMatrix::from_rows(vec![
            vec![num(1.0), Cell::Text("a".into())],
            vec![num(2.0), Cell::Text("b".into())],
        ]);
        let new = TabularMatrix::from_rows(vec![
            vec![Cell::Missing, Cell::Text("a".into())],
            vec![num(2.0), Cell::Missing],
        ]);
        assert_eq!(null_count(&new), 1);
        let b = risk_breakdown(&old, &new, &RiskWeights::default());
        assert!(close(b.nulls_delta, 0.25));
        assert!(close(b.score, 0.05));
    }

    #[test]
    fn text_duplicates_are_ignored() {
        let m = TabularMatrix::from_rows(vec![
            vec![Cell::Text("x".into())],
            vec![Cell::Text("x".into())],
        ]);
        assert_eq!(duplicate_count(&m), 0);
    }

    #[test]
    fn negative_zero_equals_zero() {
        let m = grid(&[&[0.0], &[-0.0]]);
        assert_eq!(duplicate_count(&m), 1);
    }

    #[test]
    fn custom_weights_change_the_score() {
        let old = grid(&[&[1.0], &[2.0], &[3.0], &[4.0]]);
        let new = grid(&[&[1.0], &[2.0]]);
        let rows_only = RiskWeights {
            rows: 1.0,
            columns: 0.0,
            duplicates: 0.0,
            nulls: 0.0,
        };
        assert!(close(risk(&old, &new, &rows_only), 0.5));
        assert!(close(risk(&old, &new, &RiskWeights::default()), 0.1));
    }

    #[test]
    fn swapping_sides_is_symmetric_for_equal_shapes() {
        let a = grid(&[&[1.0, 2.0], &[1.0, 3.0], &[4.0, 5.0]]);
        let b = TabularMatrix::from_rows(vec![
            vec![num(1.0), Cell::Missing],
            vec![num(2.0), num(3.0)],
            vec![num(4.0), num(5.0)],
        ]);
        let w = RiskWeights::default();
        assert!(close(risk(&a, &b, &w), risk(&b, &a, &w)));
    }

    #[test]
    fn risk_level_boundaries() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.099), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.1), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.29), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.3), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.7), RiskLevel::Critical);
        assert_eq!(RiskLevel::Critical.to_string(), "Critical");
    }
}
