//! Endpoint command implementation.
//!
//! Each subcommand is a re-entry point into the deployment lifecycle, so a failed
//! `cedar run` can be resumed by hand from the step that failed.

use super::{print_json, types::EndpointCommand};
use crate::config::{cancel_on_ctrl_c, CliContext};
use anyhow::Context;
use cedar_pipeline::{Endpoint, EndpointManager, EndpointStatus};
use colored::Colorize;
use serde_json::json;

pub async fn execute(ctx: &CliContext, command: EndpointCommand) -> anyhow::Result<()> {
    let manager = EndpointManager::new(ctx.platform()?, ctx.config.serving.poll.clone());
    let serving = &ctx.config.serving;
    let endpoint_name = |name: Option<String>| name.unwrap_or_else(|| serving.endpoint_name.clone());

    match command {
        EndpointCommand::RegisterModel { name, model_data_url, image } => {
            let image = image.unwrap_or_else(|| ctx.config.training.image.clone());
            let model = manager
                .register_model(&name, &image, &model_data_url)
                .await
                .with_context(|| format!("Failed to register model {name}"))?;
            if ctx.json {
                return print_json(&model);
            }
            println!("{} Registered model {}", "✓".green(), model.name.bold());
            println!("  {}", model.model_data_url.dimmed());
        }
        EndpointCommand::CreateConfig { name, model, memory_mb, max_concurrency } => {
            let name = name.unwrap_or_else(|| serving.config_name.clone());
            let config = manager
                .create_config(
                    &name,
                    &model,
                    memory_mb.unwrap_or(serving.memory_mb),
                    max_concurrency.unwrap_or(serving.max_concurrency),
                )
                .await
                .with_context(|| format!("Failed to create endpoint config {name}"))?;
            if ctx.json {
                return print_json(&config);
            }
            println!("{} Created endpoint config {}", "✓".green(), config.name.bold());
            println!(
                "  model {}, variant {}, {} MB, max concurrency {}",
                config.model_name,
                config.variant_name,
                config.sizing.memory.megabytes(),
                config.sizing.max_concurrency
            );
        }
        EndpointCommand::Create { name, config_name, wait } => {
            let name = endpoint_name(name);
            let config_name = config_name.unwrap_or_else(|| serving.config_name.clone());
            let mut endpoint = manager
                .create_endpoint(&name, &config_name)
                .await
                .with_context(|| format!("Failed to create endpoint {name}"))?;
            if wait {
                endpoint = wait_in_service(ctx, &manager, &name).await?;
            }
            print_endpoint(ctx, &endpoint)?;
        }
        EndpointCommand::Update { name, config_name, wait } => {
            let name = endpoint_name(name);
            let mut endpoint = manager
                .update_endpoint(&name, &config_name)
                .await
                .with_context(|| format!("Failed to update endpoint {name}"))?;
            if wait {
                endpoint = wait_in_service(ctx, &manager, &name).await?;
            }
            print_endpoint(ctx, &endpoint)?;
        }
        EndpointCommand::Describe { name } => {
            let name = endpoint_name(name);
            let endpoint =
                manager.describe(&name).await.with_context(|| format!("Failed to describe endpoint {name}"))?;
            print_endpoint(ctx, &endpoint)?;
        }
        EndpointCommand::List => {
            let endpoints = manager.list().await.context("Failed to list endpoints")?;
            if ctx.json {
                return print_json(&endpoints);
            }
            if endpoints.is_empty() {
                println!("{}", "No endpoints".yellow());
                return Ok(());
            }
            println!("{}", "Endpoints".bold().cyan());
            for summary in &endpoints {
                println!("  {:<48} {}", summary.name, colored_status(summary.status));
            }
        }
        EndpointCommand::Wait { name } => {
            let name = endpoint_name(name);
            let endpoint = wait_in_service(ctx, &manager, &name).await?;
            print_endpoint(ctx, &endpoint)?;
        }
        EndpointCommand::Delete { name } => {
            let name = endpoint_name(name);
            manager.delete_endpoint(&name).await.with_context(|| format!("Failed to delete endpoint {name}"))?;
            if ctx.json {
                return print_json(&json!({ "deleted": name }));
            }
            println!("{} Deleted endpoint {}", "✓".green(), name.bold());
        }
    }
    Ok(())
}

async fn wait_in_service(ctx: &CliContext, manager: &EndpointManager, name: &str) -> anyhow::Result<Endpoint> {
    if !ctx.json {
        println!("{}", format!("Waiting for {name} to enter service...").dimmed());
    }
    let cancel = cancel_on_ctrl_c();
    manager.await_in_service(name, &cancel).await.with_context(|| format!("Endpoint {name} is not in service"))
}

fn print_endpoint(ctx: &CliContext, endpoint: &Endpoint) -> anyhow::Result<()> {
    if ctx.json {
        return print_json(endpoint);
    }
    println!("{}", "Endpoint".bold().cyan());
    println!("  Name:     {}", endpoint.name.bold());
    println!("  ARN:      {}", endpoint.arn.dimmed());
    println!("  Config:   {}", endpoint.config_name);
    println!("  Status:   {}", colored_status(endpoint.status));
    if let Some(reason) = &endpoint.failure_reason {
        println!("  Failure:  {}", reason.red());
    }
    println!("  Created:  {}", endpoint.created_at.to_rfc3339());
    println!("  Modified: {}", endpoint.last_modified_at.to_rfc3339());
    Ok(())
}

fn colored_status(status: EndpointStatus) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        EndpointStatus::InService => text.green(),
        EndpointStatus::Failed => text.red(),
        _ => text.yellow(),
    }
}
