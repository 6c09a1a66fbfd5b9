//! Training job submission and tracking.

pub mod job;
pub mod orchestrator;
pub mod service;

pub use job::{
    Hyperparameters, InputChannel, TrainingJob, TrainingJobId, TrainingJobSpec, TrainingJobStatus,
    TrainingResources,
};
pub use orchestrator::TrainingOrchestrator;
pub use service::TrainingService;
