//! Stage command: prepare and upload.

use super::{dataset_source, print_json, types::DatasetArgs};
use crate::config::CliContext;
use anyhow::Context;
use colored::Colorize;

pub async fn execute(ctx: &mut CliContext, args: &DatasetArgs) -> anyhow::Result<()> {
    let source = dataset_source(ctx, args)?;
    let pipeline = ctx.pipeline()?;

    let split = pipeline.prepare(&source).context("Failed to prepare dataset")?;
    let staged = pipeline.stage(&split).await.context("Failed to stage dataset")?;

    if ctx.json {
        return print_json(&staged);
    }

    println!();
    println!("{}", "Staged artifacts".bold().cyan());
    println!("  train: {}", staged.train.uri().green());
    println!("  test:  {}", staged.test.uri().green());
    Ok(())
}
