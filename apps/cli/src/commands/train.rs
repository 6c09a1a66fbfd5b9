//! Train command: prepare, stage and train without deploying.

use super::{dataset_source, print_json, types::DatasetArgs};
use crate::config::{cancel_on_ctrl_c, CliContext};
use anyhow::Context;
use chrono::Utc;
use colored::Colorize;

/// Execute the train command.
///
/// Blocks until the job completes or fails. The model artifact printed at the end is what
/// `cedar endpoint register-model --model-data-url` expects.
pub async fn execute(ctx: &mut CliContext, args: &DatasetArgs) -> anyhow::Result<()> {
    let source = dataset_source(ctx, args)?;
    let pipeline = ctx.pipeline()?;
    let cancel = cancel_on_ctrl_c();

    let split = pipeline.prepare(&source).context("Failed to prepare dataset")?;
    let staged = pipeline.stage(&split).await.context("Failed to stage dataset")?;
    let spec = pipeline.training_spec(&staged, Utc::now());
    let job = pipeline.train(&spec, &cancel).await.with_context(|| format!("Training job {} did not complete", spec.job_id))?;

    if ctx.json {
        return print_json(&job);
    }

    println!();
    println!("{}", "Training complete".bold().cyan());
    println!("  Job:    {}", job.job_id.to_string().green());
    println!("  Status: {}", job.status.to_string().green());
    if let Some(artifact) = &job.model_artifact {
        println!("  Model:  {}", artifact.dimmed());
    }
    Ok(())
}
