use std::fmt;

/// One value of a parsed table.
///
/// # Examples
///
/// ```
/// use stagedrift_tabular::matrix::Cell;
///
/// assert_eq!(Cell::parse("3.5"), Cell::Number(3.5));
/// assert_eq!(Cell::parse(""), Cell::Missing);
/// assert_eq!(Cell::parse("NaN"), Cell::Missing);
/// assert_eq!(Cell::parse("abc"), Cell::Text("abc".into()));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// A numeric value.
    Number(f64),
    /// Any non-numeric value.
    Text(String),
    /// An empty or NA value.
    Missing,
}

/// Tokens read as missing values, in addition to the empty string.
const NA_TOKENS: &[&str] = &[
    "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "#N/A", "<NA>",
];

impl Cell {
    /// Classify a raw text field.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || NA_TOKENS.contains(&trimmed) {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_nan() => Cell::Missing,
            Ok(v) => Cell::Number(v),
            Err(_) => Cell::Text(raw.to_string()),
        }
    }

    /// Returns `true` for a missing value or a NaN number.
    pub fn is_missing(&self) -> bool {
        match self {
            Cell::Missing => true,
            Cell::Number(v) => v.is_nan(),
            Cell::Text(_) => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(v) => write!(f, "{v}"),
            Cell::Text(s) => f.write_str(s),
            Cell::Missing => f.write_str("NaN"),
        }
    }
}

/// A rectangular, possibly empty, table of cells.
///
/// # Examples
///
/// ```
/// use stagedrift_tabular::matrix::{Cell, TabularMatrix};
///
/// let m = TabularMatrix::from_rows(vec![
///     vec![Cell::Number(1.0), Cell::Text("a".into())],
///     vec![Cell::Number(2.0)],
/// ]);
/// assert_eq!(m.shape(), (2, 2));
/// assert!(m.is_numeric_column(0));
/// assert!(!m.is_numeric_column(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularMatrix {
    rows: Vec<Vec<Cell>>,
    columns: usize,
}

impl TabularMatrix {
    /// A 0×0 matrix.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a matrix from rows, padding short rows with [`Cell::Missing`].
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Self {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        Self::with_columns(rows, columns)
    }

    /// Build a matrix with a fixed column count, padding short rows.
    ///
    /// Longer rows are truncated; loaders reject them before calling this.
    pub fn with_columns(mut rows: Vec<Vec<Cell>>, columns: usize) -> Self {
        for row in &mut rows {
            row.resize(columns, Cell::Missing);
        }
        if columns == 0 {
            rows.clear();
        }
        Self { rows, columns }
    }

    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns)
    }

    /// Returns `true` for a matrix without cells.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns == 0
    }

    /// Rows in file order.
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Cells of column `idx`, top to bottom.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().filter_map(move |row| row.get(idx))
    }

    /// A column is numeric when every cell is a number or missing.
    ///
    /// An all-missing column counts as numeric, as a column of NaN floats would.
    pub fn is_numeric_column(&self, idx: usize) -> bool {
        idx < self.columns && self.column(idx).all(|c| !matches!(c, Cell::Text(_)))
    }
}
