//! Run command: the whole pipeline end to end.

use super::{dataset_source, print_json, types::DatasetArgs};
use crate::config::{cancel_on_ctrl_c, CliContext};
use anyhow::Context;
use colored::Colorize;

pub async fn execute(ctx: &mut CliContext, args: &DatasetArgs, no_wait: bool) -> anyhow::Result<()> {
    let source = dataset_source(ctx, args)?;
    if no_wait {
        ctx.config.serving.wait_for_endpoint = false;
    }
    let pipeline = ctx.pipeline()?;
    let cancel = cancel_on_ctrl_c();

    let run = pipeline.run(&source, &cancel).await.context("Pipeline run failed")?;
    let manifest = run.manifest();

    if ctx.json {
        return print_json(&manifest);
    }

    println!();
    println!("{}", "Pipeline complete".bold().cyan());
    println!();
    println!("  Job:       {}", manifest.job_id.to_string().green());
    println!("  Rows:      {} train, {} test", manifest.train_rows, manifest.test_rows);
    for artifact in &manifest.artifacts {
        println!("  Staged:    {}", artifact.uri().dimmed());
    }
    println!("  Model:     {}", manifest.model_name);
    println!(
        "  Config:    {} ({} MB, max concurrency {})",
        manifest.endpoint_config.name,
        manifest.endpoint_config.sizing.memory.megabytes(),
        manifest.endpoint_config.sizing.max_concurrency
    );
    println!("  Endpoint:  {} {}", manifest.endpoint_name.green(), manifest.endpoint_status.to_string().bold());
    Ok(())
}
