//! Config command: print the effective configuration.

use super::{print_json, types::ConfigCommand};
use crate::config::CliContext;
use anyhow::Context;

pub fn execute(ctx: &CliContext, command: &ConfigCommand) -> anyhow::Result<()> {
    match command {
        ConfigCommand::Show => {
            if ctx.json {
                return print_json(&ctx.config);
            }
            let rendered = ctx.config.to_toml().context("Failed to render configuration")?;
            print!("{rendered}");
        }
    }
    Ok(())
}
