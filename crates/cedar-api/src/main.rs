//! `cedar-api` - prediction proxy in front of a hosted endpoint.

use anyhow::Context;
use cedar_api::{ApiConfig, ApiState, PredictionServer};
use cedar_pipeline::{CancellationToken, PipelineConfig, SimulatedPlatform, WorkspaceLayout};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cedar-api", version, about = "Serve predictions from a hosted cedar endpoint")]
struct Args {
    /// API configuration file (feature order, defaults, endpoint name)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration file
    #[arg(short, long)]
    address: Option<String>,

    /// Endpoint name, overriding the configuration file
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Workspace whose simulated platform hosts the endpoint
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cedar_api=info,cedar_pipeline=info".into());
    if args.json_logs {
        tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
    }

    let mut config = match &args.config {
        Some(path) => ApiConfig::load_from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => ApiConfig::default(),
    };
    if let Some(address) = args.address {
        config.address = address;
    }
    if let Some(endpoint) = args.endpoint {
        config.endpoint_name = endpoint;
    }
    config.validate()?;

    let pipeline_config = PipelineConfig::discover_and_load().context("loading pipeline configuration")?;
    let layout = WorkspaceLayout::for_workspace_root(&args.workspace);
    let platform = SimulatedPlatform::persistent(&layout.platform_state_path(), pipeline_config.platform)
        .context("opening simulated platform state")?;

    let server = PredictionServer::bind(ApiState::new(config, Arc::new(platform))).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    server.serve(shutdown).await?;
    Ok(())
}
