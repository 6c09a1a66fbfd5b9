use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Missing,
}

impl Value {
    /// Parse a raw delimited-text cell.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Self::Number(n),
            _ => Self::Text(trimmed.to_string()),
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => n.fmt(f),
            Self::Text(s) => f.write_str(s),
            Self::Missing => Ok(()),
        }
    }
}

/// One row. `index` is the row's position in the source it was loaded from and stays
/// attached to the row through splits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub index: usize,
    pub values: Vec<Value>,
}

/// An ordered table with a fixed schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
    label: Option<String>,
}

impl Dataset {
    /// Build a dataset, rejecting rows whose width differs from the schema.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> PipelineResult<Self> {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(index, values)| Row { index, values })
            .collect();
        Self::from_rows(columns, rows)
    }

    pub(crate) fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> PipelineResult<Self> {
        for row in &rows {
            if row.values.len() != columns.len() {
                return Err(PipelineError::Schema(format!(
                    "row {} has {} values but the schema has {} columns",
                    row.index,
                    row.values.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self { columns, rows, label: None })
    }

    /// Mark `column` as the label column.
    pub fn with_label(mut self, column: &str) -> PipelineResult<Self> {
        if self.column_index(column).is_none() {
            return Err(PipelineError::Schema(format!(
                "label column '{column}' not found in schema [{}]",
                self.columns.join(", ")
            )));
        }
        self.label = Some(column.to_string());
        Ok(self)
    }

    /// Load a CSV file with a header row. Header names are trimmed.
    pub fn from_csv_path(path: &Path) -> PipelineResult<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            PipelineError::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display())))
        })?;
        Self::from_csv_reader(file)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> PipelineResult<Self> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).flexible(true).from_reader(reader);

        let columns: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        if columns.is_empty() || columns.iter().all(String::is_empty) {
            return Err(PipelineError::Schema("CSV input has no header row".to_string()));
        }

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(Value::parse).collect());
        }
        Self::new(columns, rows)
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Look up a cell by column name.
    #[must_use]
    pub fn value<'a>(&self, row: &'a Row, column: &str) -> Option<&'a Value> {
        self.column_index(column).and_then(|i| row.values.get(i))
    }
}

/// Where a dataset comes from.
#[derive(Debug, Clone)]
pub enum DatasetSource {
    /// Delimited text with a header row.
    Csv { path: PathBuf },
    /// An already-loaded table.
    Inline(Dataset),
}

impl DatasetSource {
    pub fn load(&self) -> PipelineResult<Dataset> {
        match self {
            Self::Csv { path } => Dataset::from_csv_path(path),
            Self::Inline(dataset) => Ok(dataset.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_parse_and_display() {
        assert_eq!(Value::parse("45"), Value::Number(45.0));
        assert_eq!(Value::parse(" 2.3 "), Value::Number(2.3));
        assert_eq!(Value::parse(""), Value::Missing);
        assert_eq!(Value::parse("benign"), Value::Text("benign".to_string()));
        assert_eq!(Value::Number(45.0).to_string(), "45");
        assert_eq!(Value::Number(2.3).to_string(), "2.3");
        assert_eq!(Value::Missing.to_string(), "");
    }

    #[test]
    fn test_from_csv_trims_headers() {
        let csv = " Age ,Tumor Size,target\n45,2.3,1\n50,1.1,0\n";
        let ds = Dataset::from_csv_reader(csv.as_bytes()).unwrap();
        assert_eq!(ds.columns(), &["Age", "Tumor Size", "target"]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.rows()[1].index, 1);
        assert_eq!(ds.value(&ds.rows()[0], "Tumor Size"), Some(&Value::Number(2.3)));
    }

    #[test]
    fn test_ragged_rows_are_schema_errors() {
        let csv = "a,b\n1,2\n3\n";
        let err = Dataset::from_csv_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_with_label_requires_column() {
        let ds = Dataset::new(vec!["a".to_string()], vec![vec![Value::Number(1.0)]]).unwrap();
        assert!(matches!(ds.clone().with_label("target"), Err(PipelineError::Schema(_))));
        assert_eq!(ds.with_label("a").unwrap().label(), Some("a"));
    }

    #[test]
    fn test_value_borrows_from_row_not_dataset() {
        let csv = "Age,target\n45,1\n";
        let row = Dataset::from_csv_reader(csv.as_bytes()).unwrap().rows()[0].clone();
        let age = {
            let ds = Dataset::from_csv_reader(csv.as_bytes()).unwrap();
            ds.value(&row, "Age")
        };
        assert_eq!(age, Some(&Value::Number(45.0)));
    }
}
