//! Prepare command: split a dataset locally.

use super::{dataset_source, print_json, types::DatasetArgs};
use crate::config::CliContext;
use anyhow::Context;
use cedar_pipeline::{prepare, write_local};
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;

pub fn execute(ctx: &mut CliContext, args: &DatasetArgs, out: Option<PathBuf>) -> anyhow::Result<()> {
    let source = dataset_source(ctx, args)?;
    let settings = &ctx.config.dataset;
    let split = prepare(&source, &settings.label_column, settings.test_fraction, settings.seed)
        .with_context(|| format!("Failed to prepare {}", args.input.display()))?;

    let out_dir = out.unwrap_or_else(|| ctx.prepared_dir());
    let storage = &ctx.config.storage;
    let (train_path, test_path) = write_local(&split, &out_dir, storage.format, storage.label_placement)
        .with_context(|| format!("Failed to write splits to {}", out_dir.display()))?;

    if ctx.json {
        return print_json(&json!({
            "label_column": split.label_column,
            "seed": split.seed,
            "test_fraction": split.test_fraction,
            "train_rows": split.train.len(),
            "test_rows": split.test.len(),
            "train_path": train_path,
            "test_path": test_path,
        }));
    }

    println!("{}", "Dataset prepared".bold().cyan());
    println!();
    println!("  Label:  {}", split.label_column.green());
    println!("  Seed:   {}", split.seed);
    println!("  Train:  {} rows -> {}", split.train.len(), train_path.display().to_string().dimmed());
    println!("  Test:   {} rows -> {}", split.test.len(), test_path.display().to_string().dimmed());
    Ok(())
}
