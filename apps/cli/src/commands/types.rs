//! Command type definitions shared between main.rs and the command modules.

use clap::{Args, Subcommand};
use std::path::PathBuf;

/// A labelled CSV file with a header row.
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// CSV file with a header row
    #[arg(short, long)]
    pub input: PathBuf,

    /// Label column (defaults to dataset.label_column)
    #[arg(long)]
    pub label: Option<String>,

    /// Held-out fraction in (0, 1) (defaults to dataset.test_fraction)
    #[arg(long)]
    pub test_fraction: Option<f64>,

    /// Shuffle seed (defaults to dataset.seed)
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum EndpointCommand {
    /// Register a trained model archive with the hosting service
    RegisterModel {
        /// Model name (usually the training job name)
        #[arg(long)]
        name: String,

        /// Location of the model archive, e.g. s3://bucket/prefix/output/job/output/model.tar.gz
        #[arg(long)]
        model_data_url: String,

        /// Serving image (defaults to training.image)
        #[arg(long)]
        image: Option<String>,
    },

    /// Create a serverless endpoint configuration
    CreateConfig {
        /// Config name (defaults to serving.config_name)
        #[arg(long)]
        name: Option<String>,

        /// Registered model to serve
        #[arg(long)]
        model: String,

        /// Memory tier in MB: 1024, 2048, 3072, 4096, 5120 or 6144
        #[arg(long)]
        memory_mb: Option<u32>,

        /// Maximum concurrent invocations (1-200)
        #[arg(long)]
        max_concurrency: Option<u32>,
    },

    /// Create an endpoint bound to an existing config
    Create {
        /// Endpoint name (defaults to serving.endpoint_name)
        #[arg(long)]
        name: Option<String>,

        /// Config name (defaults to serving.config_name)
        #[arg(long)]
        config_name: Option<String>,

        /// Wait until the endpoint is in service
        #[arg(long)]
        wait: bool,
    },

    /// Redeploy an endpoint onto another config
    Update {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        config_name: String,

        #[arg(long)]
        wait: bool,
    },

    /// Show an endpoint's status, and its failure reason if it failed
    Describe {
        #[arg(long)]
        name: Option<String>,
    },

    /// List endpoints
    List,

    /// Wait until an endpoint is in service
    Wait {
        #[arg(long)]
        name: Option<String>,
    },

    /// Delete an endpoint
    Delete {
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
}
