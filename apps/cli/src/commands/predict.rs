//! Predict command: batch inference over a CSV file.

use super::print_json;
use crate::config::CliContext;
use anyhow::Context;
use cedar_pipeline::{BatchInferenceClient, Dataset};
use colored::Colorize;
use std::path::Path;

/// Execute the predict command.
///
/// Failed rows are reported and do not fail the command.
pub async fn execute(ctx: &CliContext, input: &Path, url: &str, concurrency: Option<usize>) -> anyhow::Result<()> {
    let dataset = Dataset::from_csv_path(input).with_context(|| format!("Failed to read {}", input.display()))?;

    let mut options = ctx.config.inference.clone();
    if let Some(concurrency) = concurrency {
        options.concurrency = concurrency;
    }
    let client = BatchInferenceClient::new(options).context("Invalid inference options")?;

    let report = client.run_batch(url, &dataset, ctx.sink().as_ref()).await;

    if ctx.json {
        return print_json(&report);
    }

    println!();
    let summary = format!("{} rows: {} succeeded, {} failed", report.outcomes.len(), report.succeeded(), report.failed());
    if report.failed() == 0 {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.yellow());
    }
    Ok(())
}
