//! Configuration loading and service wiring shared by every command.

use anyhow::{Context, Result};
use cedar_pipeline::{
    CancellationToken, LocalObjectStore, Pipeline, PipelineConfig, ProgressSink, SimulatedPlatform, StdoutProgressSink,
    TracingProgressSink, WorkspaceLayout,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a command needs: effective configuration and workspace paths.
pub struct CliContext {
    pub config: PipelineConfig,
    pub layout: WorkspaceLayout,
    pub json: bool,
}

impl CliContext {
    /// Configuration precedence:
    /// 1. CLI arguments (applied by each command)
    /// 2. Environment variables (`CEDAR_*`)
    /// 3. `--config` file, or `./cedar.toml` layered over `~/.cedar/config.toml`
    /// 4. Defaults
    pub fn load(config_path: Option<&Path>, workspace: &Path, json: bool) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => PipelineConfig::load_from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => PipelineConfig::discover_and_load().context("Failed to load configuration")?,
        };
        config.apply_env();
        config.validate().context("Invalid configuration")?;

        Ok(Self { config, layout: WorkspaceLayout::for_workspace_root(workspace), json })
    }

    pub fn store(&self) -> Arc<LocalObjectStore> {
        Arc::new(LocalObjectStore::new(self.layout.storage_dir()))
    }

    pub fn platform(&self) -> Result<Arc<SimulatedPlatform>> {
        let path = self.layout.platform_state_path();
        let platform = SimulatedPlatform::persistent(&path, self.config.platform.clone())
            .with_context(|| format!("Failed to open platform state at {}", path.display()))?;
        Ok(Arc::new(platform))
    }

    /// Stage and row lines go to stdout, or to the log on stderr when stdout carries JSON.
    pub fn sink(&self) -> Arc<dyn ProgressSink> {
        if self.json { Arc::new(TracingProgressSink) } else { Arc::new(StdoutProgressSink) }
    }

    pub fn pipeline(&self) -> Result<Pipeline> {
        let platform = self.platform()?;
        Ok(Pipeline::new(self.config.clone(), self.store(), platform.clone(), platform, self.sink())
            .with_layout(self.layout.clone()))
    }

    /// Directory for `prepare` output when none is given.
    pub fn prepared_dir(&self) -> PathBuf {
        self.layout.root().join("prepared")
    }
}

/// A token cancelled on Ctrl-C. Waits stop; remote work keeps running.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}
