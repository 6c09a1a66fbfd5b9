//! Cedar CLI - train a tabular classifier and put it behind a serverless endpoint.
//!
//! Every subcommand reads the layered pipeline configuration (`~/.cedar/config.toml`,
//! `./cedar.toml`, `CEDAR_*` variables) and works against the workspace's simulated
//! platform under `.cedar/_internals`.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::types::{ConfigCommand, DatasetArgs, EndpointCommand};
use config::CliContext;

/// Cedar - tabular model pipeline orchestration
#[derive(Parser, Debug)]
#[command(
    name = "cedar",
    author,
    version,
    about = "Cedar - prepare, train, deploy and query a tabular classifier",
    long_about = "Cedar prepares a labelled CSV dataset, stages it to object storage, trains a gradient-boosted model,\ndeploys it behind a serverless endpoint and runs batch predictions against it."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Workspace directory holding `.cedar/_internals`
    #[arg(short = 'w', long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Configuration file (skips ~/.cedar/config.toml and ./cedar.toml discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a dataset into train and test files
    ///
    /// Shuffles rows with a seeded generator, holds out the test fraction and writes
    /// `train` and `test` files in the configured transport format.
    Prepare {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Output directory (defaults to .cedar/_internals/prepared)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Prepare a dataset and upload the splits to object storage
    Stage {
        #[command(flatten)]
        dataset: DatasetArgs,
    },

    /// Prepare, stage and train, without deploying
    Train {
        #[command(flatten)]
        dataset: DatasetArgs,
    },

    /// Run the whole pipeline: prepare, stage, train, register, configure, deploy
    Run {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Return once the endpoint is created instead of waiting for it to serve
        #[arg(long)]
        no_wait: bool,
    },

    /// Model registration and endpoint lifecycle
    #[command(subcommand)]
    Endpoint(EndpointCommand),

    /// Call a prediction URL once per row of a CSV file
    Predict {
        /// CSV file with a header row
        #[arg(short, long)]
        input: PathBuf,

        /// Prediction URL, e.g. http://localhost:8080/predict
        #[arg(short, long)]
        url: String,

        /// Rows in flight at once (defaults to inference.concurrency)
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Configuration inspection
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut ctx = CliContext::load(args.config.as_deref(), &args.workspace, args.json)?;

    match args.command {
        Command::Prepare { dataset, out } => commands::prepare::execute(&mut ctx, &dataset, out),
        Command::Stage { dataset } => commands::stage::execute(&mut ctx, &dataset).await,
        Command::Train { dataset } => commands::train::execute(&mut ctx, &dataset).await,
        Command::Run { dataset, no_wait } => commands::run::execute(&mut ctx, &dataset, no_wait).await,
        Command::Endpoint(command) => commands::endpoint::execute(&ctx, command).await,
        Command::Predict { input, url, concurrency } => {
            commands::predict::execute(&ctx, &input, &url, concurrency).await
        }
        Command::Config(command) => commands::show::execute(&ctx, &command),
    }
}
