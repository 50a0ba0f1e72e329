use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use serde_json::Value;
use stagedrift_core::DriftError;
use tracing::{debug, warn};

use crate::matrix::{Cell, TabularMatrix};

/// Delimiters tried, in order of preference, when sniffing a `.txt` table.
const TXT_DELIMITERS: [u8; 5] = [b',', b'\t', b';', b'|', b' '];

/// Table format selected once from a file's extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use stagedrift_tabular::loader::TableFormat;
///
/// assert_eq!(TableFormat::from_path(Path::new("data/train.CSV")), TableFormat::Csv);
/// assert_eq!(TableFormat::from_path(Path::new("report.xlsx")), TableFormat::Xlsx);
/// assert_eq!(TableFormat::from_path(Path::new("model.pkl")), TableFormat::Unsupported);
/// assert_eq!(TableFormat::from_path(Path::new("Makefile")), TableFormat::Unsupported);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Tsv,
    Xlsx,
    Xls,
    Xml,
    Json,
    Txt,
    Unsupported,
}

impl TableFormat {
    /// Detect the format from the lower-cased file extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => TableFormat::Csv,
            "tsv" => TableFormat::Tsv,
            "xlsx" => TableFormat::Xlsx,
            "xls" => TableFormat::Xls,
            "xml" => TableFormat::Xml,
            "json" => TableFormat::Json,
            "txt" => TableFormat::Txt,
            _ => TableFormat::Unsupported,
        }
    }

    /// Parse `path` with this format's parser.
    ///
    /// # Errors
    ///
    /// Returns [`DriftError::Parse`] if the content does not form a table,
    /// or [`DriftError::Io`] if the file cannot be read.
    pub fn load(self, path: &Path) -> Result<TabularMatrix, DriftError> {
        match self {
            TableFormat::Csv => read_delimited(path, b','),
            TableFormat::Tsv => read_delimited(path, b'\t'),
            TableFormat::Txt => read_txt(path),
            TableFormat::Xlsx | TableFormat::Xls => read_workbook(path),
            TableFormat::Xml => read_xml(path),
            TableFormat::Json => read_json(path),
            TableFormat::Unsupported => {
                warn!(path = %path.display(), "unsupported table format, file ignored");
                Ok(TabularMatrix::empty())
            }
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TableFormat::Csv => "csv",
            TableFormat::Tsv => "tsv",
            TableFormat::Xlsx => "xlsx",
            TableFormat::Xls => "xls",
            TableFormat::Xml => "xml",
            TableFormat::Json => "json",
            TableFormat::Txt => "txt",
            TableFormat::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

/// Load one file as a [`TabularMatrix`], dispatching on its extension.
///
/// Unsupported extensions yield a 0×0 matrix and a warning, never an error.
/// Empty files yield a 0×0 matrix.
///
/// # Errors
///
/// Returns [`DriftError::FileMissing`] if `path` does not exist, or
/// [`DriftError::Parse`] if the content is not a table.
///
/// # Examples
///
/// ```
/// use stagedrift_tabular::loader::load_table;
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("data.csv");
/// std::fs::write(&path, "a,b\n1,2\n3,4\n").unwrap();
/// assert_eq!(load_table(&path).unwrap().shape(), (2, 2));
/// ```
pub fn load_table(path: &Path) -> Result<TabularMatrix, DriftError> {
    if !path.exists() {
        return Err(DriftError::FileMissing(path.to_path_buf()));
    }
    let format = TableFormat::from_path(path);
    debug!(path = %path.display(), %format, "loading table");
    format.load(path)
}

/// Load one side of a comparison; an absent side is a 0×0 matrix.
///
/// # Errors
///
/// Parse failures still propagate so the caller can decide how to degrade.
pub fn load_or_empty(path: Option<&Path>) -> Result<TabularMatrix, DriftError> {
    match path {
        Some(p) if p.is_file() => load_table(p),
        _ => Ok(TabularMatrix::empty()),
    }
}

fn parse_error(path: &Path, detail: impl fmt::Display) -> DriftError {
    DriftError::Parse {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<TabularMatrix, DriftError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| parse_error(path, e))?;

    let width = reader.headers().map_err(|e| parse_error(path, e))?.len();
    if width == 0 {
        return Ok(TabularMatrix::empty());
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| parse_error(path, e))?;
        if record.len() > width {
            return Err(parse_error(
                path,
                format!(
                    "expected {width} fields in line {}, saw {}",
                    idx + 2,
                    record.len()
                ),
            ));
        }
        // a bare newline inside the file is not a row
        if record.len() == 1 && record[0].is_empty() && width > 1 {
            continue;
        }
        rows.push(record.iter().map(Cell::parse).collect());
    }
    Ok(TabularMatrix::with_columns(rows, width))
}

fn read_txt(path: &Path) -> Result<TabularMatrix, DriftError> {
    let content = std::fs::read_to_string(path)?;
    let header = content.lines().next().unwrap_or("");
    read_delimited(path, sniff_delimiter(header))
}

/// Pick the most frequent candidate delimiter in the header line.
///
/// Falls back to `,`, which reads a delimiter-free file as a single column.
pub fn sniff_delimiter(header: &str) -> u8 {
    let mut best = (b',', 0usize);
    for candidate in TXT_DELIMITERS {
        let count = header.bytes().filter(|b| *b == candidate).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

fn read_workbook(path: &Path) -> Result<TabularMatrix, DriftError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| parse_error(path, e))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| parse_error(path, e))?,
        None => return Ok(TabularMatrix::empty()),
    };

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(TabularMatrix::empty());
    };
    let width = header.len();
    let data = rows
        .map(|row| row.iter().map(workbook_cell).collect())
        .collect();
    Ok(TabularMatrix::with_columns(data, width))
}

fn workbook_cell(data: &Data) -> Cell {
    match data {
        Data::Int(v) => Cell::Number(*v as f64),
        Data::Float(v) => Cell::Number(*v),
        Data::String(s) if s.trim().is_empty() => Cell::Missing,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::Empty | Data::Error(_) => Cell::Missing,
        other => Cell::Text(other.to_string()),
    }
}

fn read_xml(path: &Path) -> Result<TabularMatrix, DriftError> {
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(TabularMatrix::empty());
    }
    let doc = roxmltree::Document::parse(&content).map_err(|e| parse_error(path, e))?;

    let mut columns = NameIndex::default();
    let mut records: Vec<Vec<(usize, Cell)>> = Vec::new();

    for row in doc.root_element().children().filter(|n| n.is_element()) {
        let mut record = Vec::new();
        let mut push = |name: &str, raw: &str| {
            record.push((columns.slot(name), Cell::parse(raw)));
        };

        for attr in row.attributes() {
            push(attr.name(), attr.value());
        }
        for field in row.children().filter(|n| n.is_element()) {
            push(field.tag_name().name(), field.text().unwrap_or(""));
        }
        let own_text: String = row
            .children()
            .filter(|n| n.is_text())
            .filter_map(|n| n.text())
            .collect();
        if !own_text.trim().is_empty() {
            push(row.tag_name().name(), &own_text);
        }
        records.push(record);
    }

    let width = columns.len();
    let rows = records
        .into_iter()
        .map(|record| {
            let mut row = vec![Cell::Missing; width];
            for (idx, cell) in record {
                row[idx] = cell;
            }
            row
        })
        .collect();
    Ok(TabularMatrix::with_columns(rows, width))
}

fn read_json(path: &Path) -> Result<TabularMatrix, DriftError> {
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(TabularMatrix::empty());
    }
    let value: Value = serde_json::from_str(&content).map_err(|e| parse_error(path, e))?;
    match value {
        Value::Array(items) => Ok(json_rows(items)),
        Value::Object(map) => json_columns(path, map),
        _ => Err(parse_error(path, "expected a JSON array or object")),
    }
}

fn json_cell(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::Missing,
        Value::Number(n) => n.as_f64().map_or(Cell::Missing, Cell::Number),
        Value::String(s) => Cell::parse(s),
        Value::Bool(b) => Cell::Text(b.to_string()),
        other => Cell::Text(other.to_string()),
    }
}

/// `[{..}, ..]` records, `[[..], ..]` rows, or `[scalar, ..]` as one column.
fn json_rows(items: Vec<Value>) -> TabularMatrix {
    if items.iter().all(Value::is_object) {
        let mut columns = NameIndex::default();
        for item in &items {
            if let Value::Object(map) = item {
                for key in map.keys() {
                    columns.slot(key);
                }
            }
        }
        let rows = items
            .iter()
            .map(|item| {
                columns
                    .names()
                    .iter()
                    .map(|col| item.get(col).map_or(Cell::Missing, json_cell))
                    .collect()
            })
            .collect();
        return TabularMatrix::with_columns(rows, columns.len());
    }

    let rows = items
        .iter()
        .map(|item| match item {
            Value::Array(values) => values.iter().map(json_cell).collect(),
            scalar => vec![json_cell(scalar)],
        })
        .collect();
    TabularMatrix::from_rows(rows)
}

/// `{col: {index: value}}` or `{col: [values]}`.
fn json_columns(
    path: &Path,
    map: serde_json::Map<String, Value>,
) -> Result<TabularMatrix, DriftError> {
    let width = map.len();
    let mut index = NameIndex::default();
    let mut longest = 0usize;

    for column in map.values() {
        match column {
            Value::Object(cells) => {
                for key in cells.keys() {
                    index.slot(key);
                }
            }
            Value::Array(cells) => longest = longest.max(cells.len()),
            _ => {
                return Err(parse_error(
                    path,
                    "column values must be objects or arrays, not scalars",
                ))
            }
        }
    }

    let height = index.len().max(longest);
    let mut rows = vec![vec![Cell::Missing; width]; height];
    for (col_idx, column) in map.values().enumerate() {
        match column {
            Value::Object(cells) => {
                for (key, value) in cells {
                    if let Some(row_idx) = index.get(key) {
                        rows[row_idx][col_idx] = json_cell(value);
                    }
                }
            }
            Value::Array(cells) => {
                for (row_idx, value) in cells.iter().enumerate() {
                    rows[row_idx][col_idx] = json_cell(value);
                }
            }
            _ => {}
        }
    }
    Ok(TabularMatrix::with_columns(rows, width))
}

/// Names in first-seen order with constant-time lookup.
#[derive(Debug, Default)]
struct NameIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl NameIndex {
    /// Position of `name`, appending it if unseen.
    fn slot(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.positions.get(name) {
            return idx;
        }
        let idx = self.names.len();
        self.names.push(name.to_string());
        self.positions.insert(name.to_string(), idx);
        idx
    }

    fn get(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    fn len(&self) -> usize {
        self.names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn csv_header_is_not_a_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "data.csv", "col1,col2\n1,2\n3,4\n");
        let m = load_table(&path).unwrap();
        assert_eq!(m.shape(), (2, 2));
        assert_eq!(m.rows()[1], vec![Cell::Number(3.0), Cell::Number(4.0)]);
    }

    #[test]
    fn tsv_uses_tabs() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "data.tsv", "a\tb\tc\n1\t\tx\n");
        let m = load_table(&path).unwrap();
        assert_eq!(m.shape(), (1, 3));
        assert_eq!(m.rows()[0][1], Cell::Missing);
        assert_eq!(m.rows()[0][2], Cell::Text("x".into()));
    }

    #[test]
    fn csv_row_with_extra_fields_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "bad.csv", "a,b\n1,2,3\n");
        let err = load_table(&path).unwrap_err();
        assert!(matches!(err, DriftError::Parse { .. }));
    }

    #[test]
    fn csv_short_rows_are_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "short.csv", "a,b,c\n1,2\n");
        let m = load_table(&path).unwrap();
        assert_eq!(m.shape(), (1, 3));
        assert_eq!(m.rows()[0][2], Cell::Missing);
    }

    #[test]
    fn header_only_csv_has_columns_but_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "empty_rows.csv", "a,b\n");
        assert_eq!(load_table(&path).unwrap().shape(), (0, 2));
    }

    #[test]
    fn empty_file_is_empty_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "empty.csv", "");
        assert_eq!(load_table(&path).unwrap().shape(), (0, 0));
    }

    #[test]
    fn txt_sniffs_semicolons() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "table.txt", "a;b\n1;2\n3;4\n5;6\n");
        assert_eq!(load_table(&path).unwrap().shape(), (3, 2));
    }

    #[test]
    fn txt_without_delimiter_is_one_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "values.txt", "value\n1\n2\n");
        assert_eq!(load_table(&path).unwrap().shape(), (2, 1));
    }

    #[test]
    fn sniff_prefers_most_frequent_candidate() {
        assert_eq!(sniff_delimiter("a\tb\tc"), b'\t');
        assert_eq!(sniff_delimiter("a|b|c,d"), b'|');
        assert_eq!(sniff_delimiter("single"), b',');
    }

    #[test]
    fn json_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "data.json",
            r#"[{"col1": 1, "col2": 2}, {"col1": 3, "col2": null}, {"col3": "x"}]"#,
        );
        let m = load_table(&path).unwrap();
        assert_eq!(m.shape(), (3, 3));
        assert_eq!(m.rows()[1][1], Cell::Missing);
        assert_eq!(m.rows()[2][2], Cell::Text("x".into()));
    }

    #[test]
    fn json_column_orient() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "columns.json",
            r#"{"col1": {"0": 1, "1": 3}, "col2": {"0": 2, "1": 4}}"#,
        );
        let m = load_table(&path).unwrap();
        assert_eq!(m.shape(), (2, 2));
        assert_eq!(m.rows()[1], vec![Cell::Number(3.0), Cell::Number(4.0)]);
    }

    #[test]
    fn name_index_keeps_first_seen_order() {
        let mut index = NameIndex::default();
        assert_eq!(index.slot("b"), 0);
        assert_eq!(index.slot("a"), 1);
        assert_eq!(index.slot("b"), 0);
        assert_eq!(index.get("a"), Some(1));
        assert_eq!(index.get("c"), None);
        assert_eq!(index.names().to_vec(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn large_column_orient_json_loads_every_row() {
        let rows = 50_000;
        let col = |offset: usize| {
            (0..rows)
                .map(|i| format!("\"{i}\": {}", i + offset))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "big.json",
            &format!("{{\"a\": {{{}}}, \"b\": {{{}}}}}", col(0), col(1)),
        );

        let started = std::time::Instant::now();
        let m = load_table(&path).unwrap();
        assert_eq!(m.shape(), (rows, 2));
        assert!(m.rows().iter().all(|row| !row.iter().any(Cell::is_missing)));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[test]
    fn json_column_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "arrays.json", r#"{"a": [1, 2, 3], "b": ["x", "y"]}"#);
        let m = load_table(&path).unwrap();
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m.rows()[2][1], Cell::Missing);
    }

    #[test]
    fn json_scalar_columns_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "scalars.json", r#"{"a": 1, "b": 2}"#);
        assert!(matches!(
            load_table(&path),
            Err(DriftError::Parse { .. })
        ));
    }

    #[test]
    fn xml_rows_are_root_children() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "data.xml",
            r#"<?xml version="1.0"?>
<data>
  <row id="1"><col1>1</col1><col2>2</col2></row>
  <row id="2"><col1>3</col1><col2>4</col2></row>
  <row id="3"><col1>5</col1></row>
</data>"#,
        );
        let m = load_table(&path).unwrap();
        assert_eq!(m.shape(), (3, 3));
        assert_eq!(m.rows()[2][2], Cell::Missing);
        assert!(m.is_numeric_column(0));
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "broken.xml", "<data><row></data>");
        assert!(matches!(load_table(&path), Err(DriftError::Parse { .. })));
    }

    #[test]
    fn corrupt_workbook_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "sheet.xlsx", "not a zip archive");
        assert!(matches!(load_table(&path), Err(DriftError::Parse { .. })));
    }

    #[test]
    fn unsupported_extension_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "data.unsupported", "whatever");
        assert_eq!(load_table(&path).unwrap().shape(), (0, 0));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_table(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, DriftError::FileMissing(_)));
    }

    #[test]
    fn absent_side_loads_as_empty() {
        assert_eq!(load_or_empty(None).unwrap().shape(), (0, 0));
        let missing = PathBuf::from("/definitely/not/here.csv");
        assert_eq!(load_or_empty(Some(&missing)).unwrap().shape(), (0, 0));
    }
}
