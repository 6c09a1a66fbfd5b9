use crate::error::{PipelineError, PipelineResult};
use crate::format::TransportFormat;
use crate::storage::StagedArtifact;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a training job on the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingJobId(pub String);

impl TrainingJobId {
    /// `{base}-{yyyy-mm-dd-HH-MM-SS-mmm}`, the naming the hosted estimators use.
    #[must_use]
    pub fn timestamped(base: &str, at: DateTime<Utc>) -> Self {
        Self(format!("{}-{}", base.trim_end_matches('-'), at.format("%Y-%m-%d-%H-%M-%S-%3f")))
    }
}

impl std::fmt::Display for TrainingJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The fixed hyperparameter set submitted with every job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub objective: String,
    pub num_round: u32,
    pub max_depth: u32,
    pub eta: f64,
    pub eval_metric: String,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            objective: "binary:logistic".to_string(),
            num_round: 100,
            max_depth: 5,
            eta: 0.2,
            eval_metric: "auc".to_string(),
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.objective.trim().is_empty() {
            return Err(PipelineError::InvalidArgument("hyperparameter objective is required".to_string()));
        }
        if self.num_round == 0 {
            return Err(PipelineError::InvalidArgument("num_round must be >= 1".to_string()));
        }
        if self.max_depth == 0 {
            return Err(PipelineError::InvalidArgument("max_depth must be >= 1".to_string()));
        }
        if !self.eta.is_finite() || self.eta <= 0.0 || self.eta > 1.0 {
            return Err(PipelineError::InvalidArgument("eta must be in (0, 1]".to_string()));
        }
        if self.eval_metric.trim().is_empty() {
            return Err(PipelineError::InvalidArgument("hyperparameter eval_metric is required".to_string()));
        }
        Ok(())
    }

    /// String map as the training service expects it.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("objective".to_string(), self.objective.clone()),
            ("num_round".to_string(), self.num_round.to_string()),
            ("max_depth".to_string(), self.max_depth.to_string()),
            ("eta".to_string(), self.eta.to_string()),
            ("eval_metric".to_string(), self.eval_metric.clone()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingResources {
    pub instance_type: String,
    pub instance_count: u32,
    pub volume_size_gb: u32,
}

impl Default for TrainingResources {
    fn default() -> Self {
        Self { instance_type: "ml.m5.large".to_string(), instance_count: 1, volume_size_gb: 30 }
    }
}

/// A named input binding, e.g. `train -> s3://bucket/prefix/train.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputChannel {
    pub name: String,
    pub uri: String,
    pub content_type: String,
}

impl InputChannel {
    #[must_use]
    pub fn from_artifact(name: &str, artifact: &StagedArtifact) -> Self {
        Self { name: name.to_string(), uri: artifact.uri(), content_type: artifact.format.content_type().to_string() }
    }

    #[must_use]
    pub fn new(name: &str, uri: &str, format: TransportFormat) -> Self {
        Self { name: name.to_string(), uri: uri.to_string(), content_type: format.content_type().to_string() }
    }
}

/// Everything needed to launch one training job. Not modified after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJobSpec {
    pub job_id: TrainingJobId,
    pub image: String,
    pub role: String,
    pub resources: TrainingResources,
    pub hyperparameters: Hyperparameters,
    pub channels: Vec<InputChannel>,
    pub output_path: String,
}

impl TrainingJobSpec {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.job_id.0.trim().is_empty() {
            return Err(PipelineError::InvalidArgument("job name is required".to_string()));
        }
        if self.image.trim().is_empty() {
            return Err(PipelineError::InvalidArgument("training image is required".to_string()));
        }
        if self.role.trim().is_empty() {
            return Err(PipelineError::InvalidArgument("execution role is required".to_string()));
        }
        if self.resources.instance_type.trim().is_empty() || self.resources.instance_count == 0 {
            return Err(PipelineError::InvalidArgument("an instance type and count >= 1 are required".to_string()));
        }
        if !self.channels.iter().any(|c| c.name == "train") {
            return Err(PipelineError::InvalidArgument("a 'train' input channel is required".to_string()));
        }
        if self.output_path.trim().is_empty() {
            return Err(PipelineError::InvalidArgument("output path is required".to_string()));
        }
        self.hyperparameters.validate()
    }
}

/// Remote job status. Transitions are owned by the training service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrainingJobStatus {
    Submitted,
    InProgress,
    Completed,
    Failed,
}

impl TrainingJobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TrainingJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submitted => "Submitted",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Last observed state of a remote training job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingJob {
    pub job_id: TrainingJobId,
    pub status: TrainingJobStatus,
    pub failure_reason: Option<String>,
    /// Location of the trained model archive once completed.
    pub model_artifact: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn spec() -> TrainingJobSpec {
        TrainingJobSpec {
            job_id: TrainingJobId("job".to_string()),
            image: "xgboost:1.5-1".to_string(),
            role: "arn:aws:iam::000000000000:role/Execution".to_string(),
            resources: TrainingResources::default(),
            hyperparameters: Hyperparameters::default(),
            channels: vec![InputChannel::new("train", "s3://b/p/train.csv", TransportFormat::DelimitedText)],
            output_path: "s3://b/p/output".to_string(),
        }
    }

    #[test]
    fn test_timestamped_job_name() {
        let at = Utc.with_ymd_and_hms(2025, 2, 23, 22, 17, 9).unwrap();
        assert_eq!(TrainingJobId::timestamped("sagemaker-xgboost", at).0, "sagemaker-xgboost-2025-02-23-22-17-09-000");
    }

    #[test]
    fn test_hyperparameter_map_has_every_key() {
        let map = Hyperparameters::default().to_map();
        assert_eq!(map["objective"], "binary:logistic");
        assert_eq!(map["num_round"], "100");
        assert_eq!(map["max_depth"], "5");
        assert_eq!(map["eta"], "0.2");
        assert_eq!(map["eval_metric"], "auc");
    }

    #[test]
    fn test_spec_validation() {
        assert!(spec().validate().is_ok());

        let mut no_train = spec();
        no_train.channels[0].name = "validation".to_string();
        assert!(no_train.validate().is_err());

        let mut bad_eta = spec();
        bad_eta.hyperparameters.eta = 0.0;
        assert!(bad_eta.validate().is_err());

        let mut no_rounds = spec();
        no_rounds.hyperparameters.num_round = 0;
        assert!(no_rounds.validate().is_err());
    }
}
