//! Pipeline configuration file support.
//!
//! Configuration is layered: built-in defaults, then `~/.cedar/config.toml`, then
//! `./cedar.toml`, then `CEDAR_*` environment variables. Every section may be partial;
//! absent keys keep the value of the layer below.

use crate::endpoint::types::ServerlessSizing;
use crate::format::{LabelPlacement, TransportFormat};
use crate::inference::InferenceOptions;
use crate::retry::{PollPolicy, RetryPolicy};
use crate::simulated::SimulationProfile;
use crate::training::job::{Hyperparameters, TrainingResources};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variables that override single configuration values.
pub const ENV_BUCKET: &str = "CEDAR_BUCKET";
pub const ENV_PREFIX: &str = "CEDAR_PREFIX";
pub const ENV_ENDPOINT_NAME: &str = "CEDAR_ENDPOINT_NAME";
pub const ENV_LABEL_COLUMN: &str = "CEDAR_LABEL_COLUMN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Where staged datasets go and how they are encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub bucket: String,
    pub prefix: String,
    pub format: TransportFormat,
    pub label_placement: LabelPlacement,
    pub retry: RetryPolicy,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            bucket: "breast-cancer-ml-prediction".to_string(),
            prefix: "breast-cancer-xgboost".to_string(),
            format: TransportFormat::DelimitedText,
            label_placement: LabelPlacement::First,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    pub label_column: String,
    pub test_fraction: f64,
    pub seed: u64,
    /// Bind the staged test split as the training job's `validation` channel.
    pub validation_channel: bool,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self { label_column: "target".to_string(), test_fraction: 0.2, seed: 42, validation_channel: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub base_job_name: String,
    pub image: String,
    pub role: String,
    pub resources: TrainingResources,
    pub hyperparameters: Hyperparameters,
    pub poll: PollPolicy,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            base_job_name: "sagemaker-xgboost".to_string(),
            image: "sagemaker-xgboost:1.5-1".to_string(),
            role: "arn:aws:iam::000000000000:role/service-role/AmazonSageMaker-ExecutionRole".to_string(),
            resources: TrainingResources::default(),
            hyperparameters: Hyperparameters::default(),
            poll: PollPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServingSettings {
    pub config_name: String,
    pub endpoint_name: String,
    pub memory_mb: u32,
    pub max_concurrency: u32,
    /// Block `run` until the endpoint is in service.
    pub wait_for_endpoint: bool,
    pub poll: PollPolicy,
}

impl Default for ServingSettings {
    fn default() -> Self {
        Self {
            config_name: "breast-cancer-prediction-serverless-config".to_string(),
            endpoint_name: "breast-cancer-prediction-endpoint".to_string(),
            memory_mb: 1024,
            max_concurrency: 2,
            wait_for_endpoint: true,
            poll: PollPolicy {
                interval: std::time::Duration::from_secs(10),
                max_wait: std::time::Duration::from_secs(30 * 60),
                ..PollPolicy::default()
            },
        }
    }
}

/// Everything the pipeline reads from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub storage: StorageSettings,
    pub dataset: DatasetSettings,
    pub training: TrainingSettings,
    pub serving: ServingSettings,
    pub inference: InferenceOptions,
    /// Behaviour of the simulated platform used when no real platform is wired in.
    pub platform: SimulationProfile,
}

impl PipelineConfig {
    /// Load configuration from a TOML file, filling absent keys with defaults.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let table = read_table(path)?;
        Self::from_table(table, path)
    }

    /// Serialize to pretty TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(format!("Failed to serialize: {e}")))
    }

    #[must_use]
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(".")).join(".cedar").join("config.toml")
    }

    #[must_use]
    pub fn default_local_path() -> PathBuf {
        PathBuf::from("cedar.toml")
    }

    /// Layer the global and local files (local wins) over the defaults.
    ///
    /// Missing files are skipped; a file that exists but does not parse is an error.
    pub fn discover_and_load() -> ConfigResult<Self> {
        Self::load_layered(&[Self::default_global_path(), Self::default_local_path()])
    }

    /// Layer the given files in order over the defaults. Later files win per key.
    pub fn load_layered(paths: &[PathBuf]) -> ConfigResult<Self> {
        let mut merged = toml::Table::new();
        let mut last = PathBuf::from("<defaults>");
        for path in paths {
            match read_table(path) {
                Ok(table) => {
                    merge_tables(&mut merged, table);
                    last.clone_from(path);
                }
                Err(ConfigError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Self::from_table(merged, &last)
    }

    /// Apply `CEDAR_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `CEDAR_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(bucket) = non_empty(ENV_BUCKET) {
            self.storage.bucket = bucket;
        }
        if let Some(prefix) = non_empty(ENV_PREFIX) {
            self.storage.prefix = prefix;
        }
        if let Some(endpoint) = non_empty(ENV_ENDPOINT_NAME) {
            self.serving.endpoint_name = endpoint;
        }
        if let Some(label) = non_empty(ENV_LABEL_COLUMN) {
            self.dataset.label_column = label;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let required = [
            ("storage.bucket", &self.storage.bucket),
            ("storage.prefix", &self.storage.prefix),
            ("dataset.label_column", &self.dataset.label_column),
            ("training.base_job_name", &self.training.base_job_name),
            ("training.image", &self.training.image),
            ("training.role", &self.training.role),
            ("serving.config_name", &self.serving.config_name),
            ("serving.endpoint_name", &self.serving.endpoint_name),
        ];
        if let Some((key, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ConfigError::InvalidValue(format!("{key} must not be empty")));
        }
        if !(self.dataset.test_fraction > 0.0 && self.dataset.test_fraction < 1.0) {
            return Err(ConfigError::InvalidValue(format!(
                "dataset.test_fraction must be between 0 and 1 (exclusive), got {}",
                self.dataset.test_fraction
            )));
        }
        if self.training.resources.instance_count == 0 {
            return Err(ConfigError::InvalidValue("training.resources.instance_count must be >= 1".to_string()));
        }
        self.training.hyperparameters.validate().map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        ServerlessSizing::new(self.serving.memory_mb, self.serving.max_concurrency)
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        if self.inference.concurrency == 0 {
            return Err(ConfigError::InvalidValue("inference.concurrency must be >= 1".to_string()));
        }
        Ok(())
    }

    fn from_table(table: toml::Table, origin: &Path) -> ConfigResult<Self> {
        toml::Value::Table(table)
            .try_into()
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", origin.display())))
    }
}

fn read_table(path: &Path) -> ConfigResult<toml::Table> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(format!("{}: {e}", path.display())))?;
    content.parse::<toml::Table>().map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
}

/// Deep-merge `overlay` into `base`; nested tables merge, everything else replaces.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => merge_tables(existing, incoming),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
