use crate::error::{PipelineError, PipelineResult};
use crate::retry::{poll_until, Poll, PollFailure, PollPolicy};
use crate::training::job::{TrainingJob, TrainingJobSpec, TrainingJobStatus};
use crate::training::service::TrainingService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Submits training jobs and waits for them to reach a terminal state.
///
/// Holds only the job identifier between calls; every status comes from the service.
#[derive(Clone)]
pub struct TrainingOrchestrator {
    service: Arc<dyn TrainingService>,
    poll: PollPolicy,
}

impl TrainingOrchestrator {
    pub fn new(service: Arc<dyn TrainingService>, poll: PollPolicy) -> Self {
        Self { service, poll }
    }

    /// Create exactly one remote job. Not retried: a repeated call creates another job.
    pub async fn submit(&self, spec: &TrainingJobSpec) -> PipelineResult<TrainingJob> {
        spec.validate()?;

        info!(
            job_id = %spec.job_id,
            image = %spec.image,
            instance_type = %spec.resources.instance_type,
            "submitting training job"
        );
        let job_id = self
            .service
            .create_training_job(spec)
            .await
            .map_err(|e| PipelineError::TrainingSubmission(e.to_string()))?;

        Ok(TrainingJob { job_id, status: TrainingJobStatus::Submitted, failure_reason: None, model_artifact: None })
    }

    /// Poll until the job completes.
    ///
    /// A remote failure becomes [`PipelineError::TrainingFailed`] carrying the service's
    /// reason. Cancelling `cancel` stops waiting but leaves the remote job running.
    pub async fn await_completion(&self, job: &TrainingJob, cancel: &CancellationToken) -> PipelineResult<TrainingJob> {
        let service = &self.service;
        let job_id = &job.job_id;

        let finished = poll_until(&self.poll, cancel, move || async move {
            service.describe_training_job(job_id).await.map(|observed| {
                debug!(job_id = %job_id, status = %observed.status, "polled training job");
                if observed.status.is_terminal() { Poll::Ready(observed) } else { Poll::Pending }
            })
        })
        .await
        .map_err(|failure| match failure {
            PollFailure::TimedOut(waited) => PipelineError::TrainingTimeout { job_id: job_id.0.clone(), waited },
            PollFailure::Cancelled => PipelineError::Cancelled,
            PollFailure::Service(e) => PipelineError::remote("describe_training_job", &e),
        })?;

        match finished.status {
            TrainingJobStatus::Completed => {
                info!(job_id = %job_id, model_artifact = ?finished.model_artifact, "training job completed");
                Ok(finished)
            }
            _ => Err(PipelineError::TrainingFailed {
                job_id: job_id.0.clone(),
                reason: finished.failure_reason.unwrap_or_else(|| "no failure reason reported".to_string()),
            }),
        }
    }
}
