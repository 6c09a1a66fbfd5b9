use crate::error::ServiceError;
use crate::training::job::{TrainingJob, TrainingJobId, TrainingJobSpec};
use async_trait::async_trait;

/// Remote managed-training service.
///
/// The service owns every job's state; callers only create and observe.
#[async_trait]
pub trait TrainingService: Send + Sync {
    async fn create_training_job(&self, spec: &TrainingJobSpec) -> Result<TrainingJobId, ServiceError>;

    async fn describe_training_job(&self, job_id: &TrainingJobId) -> Result<TrainingJob, ServiceError>;
}
