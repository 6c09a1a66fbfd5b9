//! Transport encodings for staged datasets.

use crate::dataset::{Dataset, Value};
use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// On-the-wire encoding of a staged dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportFormat {
    /// Comma separated, no header row.
    DelimitedText,
    /// `label idx:value ...` lines with zero-based feature indices.
    SparseVector,
}

impl TransportFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::DelimitedText => "csv",
            Self::SparseVector => "libsvm",
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::DelimitedText => "text/csv",
            Self::SparseVector => "text/libsvm",
        }
    }
}

impl std::fmt::Display for TransportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Where the label column goes in delimited-text output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelPlacement {
    /// Label moved to the first column.
    #[default]
    First,
    /// Columns written in schema order.
    AsIs,
}

/// Serialize `dataset` into `format`.
///
/// Sparse-vector output requires a label column and numeric features.
pub fn encode(dataset: &Dataset, format: TransportFormat, placement: LabelPlacement) -> PipelineResult<Vec<u8>> {
    match format {
        TransportFormat::DelimitedText => encode_delimited(dataset, placement),
        TransportFormat::SparseVector => encode_sparse(dataset),
    }
}

fn column_order(dataset: &Dataset, placement: LabelPlacement) -> Vec<usize> {
    let all = 0..dataset.columns().len();
    match (placement, dataset.label().and_then(|l| dataset.column_index(l))) {
        (LabelPlacement::First, Some(label_idx)) => {
            std::iter::once(label_idx).chain(all.filter(|i| *i != label_idx)).collect()
        }
        _ => all.collect(),
    }
}

fn encode_delimited(dataset: &Dataset, placement: LabelPlacement) -> PipelineResult<Vec<u8>> {
    let order = column_order(dataset, placement);
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    for row in dataset.rows() {
        writer.write_record(order.iter().map(|i| row.values[*i].to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))
}

fn encode_sparse(dataset: &Dataset) -> PipelineResult<Vec<u8>> {
    let label = dataset
        .label()
        .ok_or_else(|| PipelineError::Schema("sparse-vector encoding requires a label column".to_string()))?;
    let label_idx = dataset
        .column_index(label)
        .ok_or_else(|| PipelineError::Schema(format!("label column '{label}' not in schema")))?;

    let mut out = String::new();
    for row in dataset.rows() {
        let label_value = row.values[label_idx].as_f64().ok_or_else(|| {
            PipelineError::Schema(format!("row {}: label '{}' is not numeric", row.index, row.values[label_idx]))
        })?;
        out.push_str(&label_value.to_string());

        let features = row.values.iter().enumerate().filter(|(i, _)| *i != label_idx);
        for (feature_idx, (col, value)) in features.enumerate() {
            match value {
                Value::Number(n) if *n != 0.0 => {
                    let _ = write!(out, " {feature_idx}:{n}");
                }
                Value::Number(_) | Value::Missing => {}
                Value::Text(t) => {
                    return Err(PipelineError::Schema(format!(
                        "row {}: column '{}' has non-numeric value '{t}'",
                        row.index,
                        dataset.columns()[col]
                    )));
                }
            }
        }
        out.push('\n');
    }
    Ok(out.into_bytes())
}
