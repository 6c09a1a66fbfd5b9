//! End-to-end runs against the simulated platform.

use cedar_pipeline::{
    CancellationToken, Dataset, DatasetSource, EndpointStatus, MemoryObjectStore, ObjectStore, Pipeline,
    PipelineConfig, PipelineError, PollPolicy, ProgressEvent, RecordingProgressSink, RunManifest, SimulatedPlatform,
    SimulationProfile, Stage, Value, WorkspaceLayout,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fast_poll() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(2),
        max_interval: Duration::from_millis(10),
        backoff_multiplier: 1.5,
        max_wait: Duration::from_secs(2),
        max_consecutive_errors: 0,
    }
}

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.training.poll = fast_poll();
    config.serving.poll = fast_poll();
    config.storage.bucket = "test-bucket".to_string();
    config.storage.prefix = "run".to_string();
    config
}

fn dataset(rows: usize) -> DatasetSource {
    let values = (0..rows)
        .map(|i| vec![Value::Number(10.0 + i as f64), Value::Number(0.5 * i as f64), Value::Number((i % 2) as f64)])
        .collect();
    let columns = vec!["mean radius".to_string(), "mean texture".to_string(), "target".to_string()];
    DatasetSource::Inline(Dataset::new(columns, values).unwrap())
}

struct Harness {
    store: Arc<MemoryObjectStore>,
    platform: Arc<SimulatedPlatform>,
    sink: Arc<RecordingProgressSink>,
}

impl Harness {
    fn new(profile: SimulationProfile) -> Self {
        Self {
            store: Arc::new(MemoryObjectStore::new()),
            platform: Arc::new(SimulatedPlatform::in_memory(profile)),
            sink: Arc::new(RecordingProgressSink::default()),
        }
    }

    fn pipeline(&self, config: PipelineConfig) -> Pipeline {
        Pipeline::new(config, self.store.clone(), self.platform.clone(), self.platform.clone(), self.sink.clone())
    }
}

#[tokio::test]
async fn test_run_deploys_an_in_service_endpoint() {
    let harness = Harness::new(SimulationProfile::instant());
    let pipeline = harness.pipeline(config());

    let run = pipeline.run(&dataset(20), &CancellationToken::new()).await.unwrap();

    assert_eq!(run.split.train.len(), 16);
    assert_eq!(run.split.test.len(), 4);
    assert_eq!(run.staged.train.uri(), "s3://test-bucket/run/train.csv");
    assert_eq!(run.staged.test.uri(), "s3://test-bucket/run/test.csv");
    assert!(run.job.model_artifact.as_deref().unwrap().ends_with("/output/model.tar.gz"));
    assert_eq!(run.deployment.model.name, run.job.job_id.0);
    assert_eq!(run.deployment.config.sizing.memory.megabytes(), 1024);
    assert_eq!(run.deployment.endpoint.status, EndpointStatus::InService);

    let staged = harness.store.get_object("test-bucket", "run/train.csv").await.unwrap();
    assert_eq!(staged.len() as u64, run.staged.train.size_bytes);
    // Label first: every line starts with 0 or 1.
    let text = String::from_utf8(staged).unwrap();
    assert!(text.lines().all(|line| line.starts_with("0,") || line.starts_with("1,")));
}

#[tokio::test]
async fn test_default_run_stages_test_split_without_validation_channel() {
    let harness = Harness::new(SimulationProfile::instant());
    let pipeline = harness.pipeline(config());

    let run = pipeline.run(&dataset(20), &CancellationToken::new()).await.unwrap();

    let test = harness.store.get_object("test-bucket", "run/test.csv").await.unwrap();
    assert_eq!(String::from_utf8(test).unwrap().lines().count(), 4);
    assert_eq!(harness.store.len(), 2);
    assert_eq!(run.manifest().artifacts.len(), 2);

    let spec = pipeline.training_spec(&run.staged, chrono::Utc::now());
    let names: Vec<&str> = spec.channels.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["train"]);
}

#[tokio::test]
async fn test_every_stage_reports_start_and_finish_in_order() {
    let harness = Harness::new(SimulationProfile::instant());
    harness.pipeline(config()).run(&dataset(10), &CancellationToken::new()).await.unwrap();

    let started: Vec<Stage> = harness
        .sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::StageStarted { stage, .. } => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        started,
        vec![
            Stage::Prepare,
            Stage::Stage,
            Stage::Train,
            Stage::RegisterModel,
            Stage::CreateConfig,
            Stage::CreateEndpoint,
            Stage::AwaitEndpoint,
        ]
    );
}

#[tokio::test]
async fn test_validation_channel_binds_staged_test_split() {
    let harness = Harness::new(SimulationProfile::instant());
    let mut config = config();
    config.dataset.validation_channel = true;
    let pipeline = harness.pipeline(config);

    let split = pipeline.prepare(&dataset(10)).unwrap();
    let staged = pipeline.stage(&split).await.unwrap();
    let spec = pipeline.training_spec(&staged, chrono::Utc::now());

    let names: Vec<&str> = spec.channels.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["train", "validation"]);
    assert_eq!(spec.channels[1].uri, "s3://test-bucket/run/test.csv");
    assert_eq!(harness.store.len(), 2);
}

#[tokio::test]
async fn test_training_failure_stops_before_deployment() {
    let harness = Harness::new(SimulationProfile {
        training_failure: Some("AlgorithmError: unable to parse label".to_string()),
        ..SimulationProfile::instant()
    });

    let err = harness.pipeline(config()).run(&dataset(10), &CancellationToken::new()).await.unwrap_err();
    match err {
        PipelineError::TrainingFailed { reason, .. } => assert_eq!(reason, "AlgorithmError: unable to parse label"),
        other => panic!("expected TrainingFailed, got {other:?}"),
    }
    assert!(!harness.sink.events().iter().any(|e| matches!(
        e,
        ProgressEvent::StageStarted { stage: Stage::RegisterModel, .. }
    )));
}

#[tokio::test]
async fn test_second_run_conflicts_on_endpoint_config() {
    let harness = Harness::new(SimulationProfile::instant());
    let pipeline = harness.pipeline(config());
    pipeline.run(&dataset(10), &CancellationToken::new()).await.unwrap();
    // Job names carry millisecond timestamps.
    tokio::time::sleep(Duration::from_millis(5)).await;

    let err = pipeline.run(&dataset(10), &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::ConfigConflict { .. }));
}

#[tokio::test]
async fn test_cancelled_run_stops_waiting() {
    let harness = Harness::new(SimulationProfile {
        training_duration: Duration::from_secs(3600),
        ..SimulationProfile::instant()
    });
    let mut config = config();
    config.training.poll.max_wait = Duration::from_secs(60);
    let pipeline = harness.pipeline(config);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let err = pipeline.run(&dataset(10), &cancel).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
}

#[tokio::test]
async fn test_manifest_and_local_splits_written_under_layout() {
    let temp = TempDir::new().unwrap();
    let layout = WorkspaceLayout::for_workspace_root(temp.path());
    let harness = Harness::new(SimulationProfile::instant());
    let pipeline = harness.pipeline(config()).with_layout(layout.clone());

    let run = pipeline.run(&dataset(10), &CancellationToken::new()).await.unwrap();

    let manifest = RunManifest::read(&layout.run_manifest_path(&run.job.job_id)).unwrap();
    assert_eq!(manifest, run.manifest());
    assert_eq!(manifest.train_rows + manifest.test_rows, 10);
    assert_eq!(manifest.endpoint_name, "breast-cancer-prediction-endpoint");
    assert!(layout.split_dir(&run.job.job_id).join("train.csv").is_file());
    assert!(layout.split_dir(&run.job.job_id).join("test.csv").is_file());
}
