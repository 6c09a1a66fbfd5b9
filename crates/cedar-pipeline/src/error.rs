use std::time::Duration;
use thiserror::Error;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Errors surfaced by pipeline stages.
///
/// Every variant is fatal to the call that produced it. Per-row inference failures are
/// not represented here; see [`crate::inference::InferenceRowError`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("staging to {uri} failed: {message}")]
    Staging { uri: String, message: String },

    #[error("training job submission failed: {0}")]
    TrainingSubmission(String),

    #[error("training job {job_id} failed: {reason}")]
    TrainingFailed { job_id: String, reason: String },

    #[error("training job {job_id} did not finish within {waited:?}")]
    TrainingTimeout { job_id: String, waited: Duration },

    #[error("endpoint config '{name}' already exists; choose a new name or delete the existing config")]
    ConfigConflict { name: String },

    #[error("endpoint '{name}' already exists")]
    EndpointConflict { name: String },

    #[error("endpoint '{name}' failed: {reason}")]
    EndpointFailed { name: String, reason: String },

    #[error("endpoint '{name}' did not reach InService within {waited:?}")]
    EndpointTimeout { name: String, waited: Duration },

    #[error("{operation} failed: {message}")]
    RemoteService { operation: &'static str, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub(crate) fn remote(operation: &'static str, err: &ServiceError) -> Self {
        Self::RemoteService { operation, message: err.to_string() }
    }
}

/// Errors reported by the remote training, hosting and invocation services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal service error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Whether a later attempt of the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_transient_classification() {
        assert!(ServiceError::Transport("reset".to_string()).is_transient());
        assert!(ServiceError::Internal("503".to_string()).is_transient());
        assert!(!ServiceError::AlreadyExists("cfg".to_string()).is_transient());
        assert!(!ServiceError::NotFound("ep".to_string()).is_transient());
    }

    #[test]
    fn test_config_conflict_message_names_config() {
        let err = PipelineError::ConfigConflict { name: "serverless-config".to_string() };
        assert!(err.to_string().contains("serverless-config"));
    }
}
