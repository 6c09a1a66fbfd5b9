//! End-to-end run: prepare, stage, train, register, configure, deploy.

use crate::config::PipelineConfig;
use crate::dataset::DatasetSource;
use crate::endpoint::manager::EndpointManager;
use crate::endpoint::service::HostingService;
use crate::endpoint::types::{Endpoint, EndpointConfig, ModelPackage};
use crate::error::{PipelineError, PipelineResult};
use crate::layout::WorkspaceLayout;
use crate::prepare::{prepare, write_local, DatasetSplit};
use crate::progress::{ProgressEvent, ProgressSink, Stage};
use crate::storage::{artifact_key, object_uri, ObjectStore, RemoteStager, StagedArtifact};
use crate::training::job::{InputChannel, TrainingJob, TrainingJobId, TrainingJobSpec};
use crate::training::orchestrator::TrainingOrchestrator;
use crate::training::service::TrainingService;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Artifacts uploaded for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedSplit {
    pub train: StagedArtifact,
    pub test: StagedArtifact,
}

/// Model, config and endpoint created for a trained job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub model: ModelPackage,
    pub config: EndpointConfig,
    pub endpoint: Endpoint,
}

/// Everything a finished [`Pipeline::run`] produced.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub split: DatasetSplit,
    pub staged: StagedSplit,
    pub job: TrainingJob,
    pub deployment: Deployment,
}

impl PipelineRun {
    #[must_use]
    pub fn manifest(&self) -> RunManifest {
        let artifacts = vec![self.staged.train.clone(), self.staged.test.clone()];
        RunManifest {
            job_id: self.job.job_id.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            label_column: self.split.label_column.clone(),
            seed: self.split.seed,
            test_fraction: self.split.test_fraction,
            train_rows: self.split.train.len(),
            test_rows: self.split.test.len(),
            artifacts,
            model_artifact: self.job.model_artifact.clone(),
            model_name: self.deployment.model.name.clone(),
            endpoint_config: self.deployment.config.clone(),
            endpoint_name: self.deployment.endpoint.name.clone(),
            endpoint_status: self.deployment.endpoint.status,
        }
    }
}

/// JSON record of a pipeline run, written under the workspace layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub job_id: TrainingJobId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub label_column: String,
    pub seed: u64,
    pub test_fraction: f64,
    pub train_rows: usize,
    pub test_rows: usize,
    pub artifacts: Vec<StagedArtifact>,
    pub model_artifact: Option<String>,
    pub model_name: String,
    pub endpoint_config: EndpointConfig,
    pub endpoint_name: String,
    pub endpoint_status: crate::endpoint::types::EndpointStatus,
}

impl RunManifest {
    pub fn write(&self, path: &Path) -> PipelineResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn read(path: &Path) -> PipelineResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Wires the stages together with one configuration.
pub struct Pipeline {
    config: PipelineConfig,
    stager: RemoteStager,
    trainer: TrainingOrchestrator,
    endpoints: EndpointManager,
    sink: Arc<dyn ProgressSink>,
    layout: Option<WorkspaceLayout>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn ObjectStore>,
        training: Arc<dyn TrainingService>,
        hosting: Arc<dyn HostingService>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        let stager = RemoteStager::new(store, config.storage.format, config.storage.label_placement)
            .with_retry(config.storage.retry.clone());
        let trainer = TrainingOrchestrator::new(training, config.training.poll.clone());
        let endpoints = EndpointManager::new(hosting, config.serving.poll.clone());
        Self { config, stager, trainer, endpoints, sink, layout: None }
    }

    /// Also write local split copies and the run manifest under `layout`.
    #[must_use]
    pub fn with_layout(mut self, layout: WorkspaceLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    fn started(&self, stage: Stage, message: impl Into<String>) {
        self.sink.on_event(ProgressEvent::StageStarted { stage, message: message.into() });
    }

    fn finished(&self, stage: Stage, message: impl Into<String>) {
        self.sink.on_event(ProgressEvent::StageFinished { stage, message: message.into() });
    }

    /// Split `source` with the configured label, fraction and seed.
    pub fn prepare(&self, source: &DatasetSource) -> PipelineResult<DatasetSplit> {
        let dataset = &self.config.dataset;
        self.started(Stage::Prepare, format!("splitting with test fraction {} and seed {}", dataset.test_fraction, dataset.seed));
        let split = prepare(source, &dataset.label_column, dataset.test_fraction, dataset.seed)?;
        self.finished(Stage::Prepare, format!("{} train rows, {} test rows", split.train.len(), split.test.len()));
        Ok(split)
    }

    /// Upload both subsets under the configured prefix.
    pub async fn stage(&self, split: &DatasetSplit) -> PipelineResult<StagedSplit> {
        let storage = &self.config.storage;
        let format = self.stager.format();
        self.started(Stage::Stage, format!("uploading to {}", object_uri(&storage.bucket, &storage.prefix)));

        let train = self.stager.stage(&split.train, &storage.bucket, &artifact_key(&storage.prefix, "train", format)).await?;
        let test = self.stager.stage(&split.test, &storage.bucket, &artifact_key(&storage.prefix, "test", format)).await?;

        self.finished(Stage::Stage, format!("{} and {}", train.uri(), test.uri()));
        Ok(StagedSplit { train, test })
    }

    /// Job spec for staged data under a fresh timestamped name.
    #[must_use]
    pub fn training_spec(&self, staged: &StagedSplit, now: DateTime<Utc>) -> TrainingJobSpec {
        let training = &self.config.training;
        let mut channels = vec![InputChannel::from_artifact("train", &staged.train)];
        if self.config.dataset.validation_channel {
            channels.push(InputChannel::from_artifact("validation", &staged.test));
        }
        TrainingJobSpec {
            job_id: TrainingJobId::timestamped(&training.base_job_name, now),
            image: training.image.clone(),
            role: training.role.clone(),
            resources: training.resources.clone(),
            hyperparameters: training.hyperparameters.clone(),
            channels,
            output_path: format!("{}/output", object_uri(&self.config.storage.bucket, &self.config.storage.prefix)),
        }
    }

    /// Submit `spec` and wait for the job to complete.
    pub async fn train(&self, spec: &TrainingJobSpec, cancel: &CancellationToken) -> PipelineResult<TrainingJob> {
        self.started(Stage::Train, format!("submitting {}", spec.job_id));
        let submitted = self.trainer.submit(spec).await?;
        let job = self.trainer.await_completion(&submitted, cancel).await?;
        self.finished(Stage::Train, format!("{} {}", job.job_id, job.status));
        Ok(job)
    }

    /// Register the job's model and put it behind the configured endpoint.
    pub async fn deploy(&self, job: &TrainingJob, cancel: &CancellationToken) -> PipelineResult<Deployment> {
        let serving = &self.config.serving;
        let model_data_url = job.model_artifact.as_deref().ok_or_else(|| PipelineError::RemoteService {
            operation: "describe_training_job",
            message: format!("job {} completed without a model artifact", job.job_id),
        })?;

        self.started(Stage::RegisterModel, model_data_url);
        let model = self.endpoints.register_model(&job.job_id.0, &self.config.training.image, model_data_url).await?;
        self.finished(Stage::RegisterModel, model.name.as_str());

        self.started(Stage::CreateConfig, serving.config_name.as_str());
        let config = self
            .endpoints
            .create_config(&serving.config_name, &model.name, serving.memory_mb, serving.max_concurrency)
            .await?;
        self.finished(Stage::CreateConfig, format!("{} MB, max concurrency {}", serving.memory_mb, serving.max_concurrency));

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        self.started(Stage::CreateEndpoint, serving.endpoint_name.as_str());
        let mut endpoint = self.endpoints.create_endpoint(&serving.endpoint_name, &config.name).await?;
        self.finished(Stage::CreateEndpoint, format!("{} {}", endpoint.name, endpoint.status));

        if serving.wait_for_endpoint {
            self.started(Stage::AwaitEndpoint, serving.endpoint_name.as_str());
            endpoint = self.endpoints.await_in_service(&serving.endpoint_name, cancel).await?;
            self.finished(Stage::AwaitEndpoint, endpoint.status.to_string());
        }

        Ok(Deployment { model, config, endpoint })
    }

    /// Run every stage in order. The first failing stage ends the run with its error.
    pub async fn run(&self, source: &DatasetSource, cancel: &CancellationToken) -> PipelineResult<PipelineRun> {
        let started_at = Utc::now();
        let split = self.prepare(source)?;
        let staged = self.stage(&split).await?;

        let spec = self.training_spec(&staged, Utc::now());
        if let Some(layout) = &self.layout {
            layout.ensure_run_dirs(&spec.job_id)?;
            write_local(&split, &layout.split_dir(&spec.job_id), self.stager.format(), self.config.storage.label_placement)?;
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let job = self.train(&spec, cancel).await?;
        let deployment = self.deploy(&job, cancel).await?;

        let run = PipelineRun { started_at, finished_at: Utc::now(), split, staged, job, deployment };
        if let Some(layout) = &self.layout {
            let path = layout.run_manifest_path(&run.job.job_id);
            run.manifest().write(&path)?;
            self.sink.on_event(ProgressEvent::Message { message: format!("run manifest written to {}", path.display()) });
        }
        info!(job_id = %run.job.job_id, endpoint = %run.deployment.endpoint.name, "pipeline run finished");
        Ok(run)
    }
}
