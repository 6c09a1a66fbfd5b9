//! Command implementations for the cedar CLI.

pub mod endpoint;
pub mod predict;
pub mod prepare;
pub mod run;
pub mod show;
pub mod stage;
pub mod train;
pub mod types;

use crate::config::CliContext;
use cedar_pipeline::DatasetSource;
use types::DatasetArgs;

/// Fold dataset flags into the loaded configuration and name the source file.
pub(crate) fn dataset_source(ctx: &mut CliContext, args: &DatasetArgs) -> anyhow::Result<DatasetSource> {
    let dataset = &mut ctx.config.dataset;
    if let Some(label) = &args.label {
        dataset.label_column.clone_from(label);
    }
    if let Some(fraction) = args.test_fraction {
        dataset.test_fraction = fraction;
    }
    if let Some(seed) = args.seed {
        dataset.seed = seed;
    }
    if !args.input.is_file() {
        anyhow::bail!("Dataset not found: {}", args.input.display());
    }
    Ok(DatasetSource::Csv { path: args.input.clone() })
}

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
