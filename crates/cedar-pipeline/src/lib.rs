//! Cedar pipeline
//!
//! Orchestration for a tabular binary classifier on a managed ML platform:
//! - Preparing and splitting datasets (`prepare`, `DatasetSplit`)
//! - Staging encoded splits to object storage (`RemoteStager`)
//! - Submitting and tracking training jobs (`TrainingOrchestrator`)
//! - Model registration and endpoint lifecycle (`EndpointManager`)
//! - Row-by-row batch inference over HTTP (`BatchInferenceClient`)
//!
//! Remote services are traits; `SimulatedPlatform` implements all of them locally.

pub mod config;
pub mod dataset;
pub mod endpoint;
pub mod error;
pub mod format;
pub mod inference;
pub mod layout;
pub mod pipeline;
pub mod prepare;
pub mod progress;
pub mod retry;
pub mod simulated;
pub mod storage;
pub mod training;

pub use config::{ConfigError, PipelineConfig};
pub use dataset::{Dataset, DatasetSource, Row, Value};
pub use endpoint::{
    Endpoint, EndpointConfig, EndpointManager, EndpointStatus, EndpointSummary, HostingService, InvocationService,
    MemoryTier, ModelPackage, ServerlessSizing, NO_FAILURE_REASON,
};
pub use error::{PipelineError, PipelineResult, ServiceError};
pub use format::{encode, LabelPlacement, TransportFormat};
pub use inference::{
    normalize_column_name, row_params, BatchInferenceClient, BatchReport, InferenceOptions, InferenceResponse,
    InferenceRowError, RowOutcome,
};
pub use layout::WorkspaceLayout;
pub use pipeline::{Deployment, Pipeline, PipelineRun, RunManifest, StagedSplit};
pub use prepare::{prepare, write_local, DatasetSplit};
pub use progress::{ProgressEvent, ProgressSink, RecordingProgressSink, Stage, StdoutProgressSink, TracingProgressSink};
pub use retry::{PollPolicy, RetryPolicy};
pub use simulated::{SimulatedPlatform, SimulationProfile};
pub use storage::{LocalObjectStore, MemoryObjectStore, ObjectStore, RemoteStager, StagedArtifact, StorageError};
pub use training::{TrainingJob, TrainingJobId, TrainingJobSpec, TrainingJobStatus, TrainingOrchestrator, TrainingService};
pub use tokio_util::sync::CancellationToken;
