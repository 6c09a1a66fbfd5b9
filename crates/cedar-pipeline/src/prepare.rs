use crate::dataset::{Dataset, DatasetSource, Row};
use crate::error::{PipelineError, PipelineResult};
use crate::format::{encode, LabelPlacement, TransportFormat};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Train/test partition of one dataset.
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub train: Dataset,
    pub test: Dataset,
    pub label_column: String,
    pub test_fraction: f64,
    pub seed: u64,
}

/// Load `source` and split it into train and test subsets.
///
/// Row positions are shuffled with a generator seeded from `seed`; the first
/// `ceil(n * test_fraction)` shuffled rows become the test set. The same source and seed
/// always produce the same split.
pub fn prepare(
    source: &DatasetSource,
    label_column: &str,
    test_fraction: f64,
    seed: u64,
) -> PipelineResult<DatasetSplit> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::InvalidArgument(format!(
            "test_fraction must be in (0, 1), got {test_fraction}"
        )));
    }

    let dataset = source.load()?.with_label(label_column)?;
    split_dataset(&dataset, label_column, test_fraction, seed)
}

fn split_dataset(dataset: &Dataset, label_column: &str, test_fraction: f64, seed: u64) -> PipelineResult<DatasetSplit> {
    let n = dataset.len();
    let test_len = ((n as f64) * test_fraction).ceil() as usize;
    let test_len = test_len.min(n);

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let pick = |positions: &[usize]| -> Vec<Row> {
        positions.iter().map(|p| dataset.rows()[*p].clone()).collect()
    };
    let (test_pos, train_pos) = order.split_at(test_len);

    let columns = dataset.columns().to_vec();
    let train = Dataset::from_rows(columns.clone(), pick(train_pos))?.with_label(label_column)?;
    let test = Dataset::from_rows(columns, pick(test_pos))?.with_label(label_column)?;

    debug!(rows = n, train = train.len(), test = test.len(), seed, "split dataset");

    Ok(DatasetSplit { train, test, label_column: label_column.to_string(), test_fraction, seed })
}

/// Write both subsets to `dir` as `train.<ext>` and `test.<ext>`.
pub fn write_local(
    split: &DatasetSplit,
    dir: &Path,
    format: TransportFormat,
    placement: LabelPlacement,
) -> PipelineResult<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)?;
    let train_path = dir.join(format!("train.{}", format.extension()));
    let test_path = dir.join(format!("test.{}", format.extension()));
    std::fs::write(&train_path, encode(&split.train, format, placement)?)?;
    std::fs::write(&test_path, encode(&split.test, format, placement)?)?;
    Ok((train_path, test_path))
}
