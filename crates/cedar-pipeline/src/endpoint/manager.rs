use crate::endpoint::service::HostingService;
use crate::endpoint::types::{
    Endpoint, EndpointConfig, EndpointStatus, EndpointSummary, ModelPackage, ServerlessSizing, DEFAULT_VARIANT,
    NO_FAILURE_REASON,
};
use crate::error::{PipelineError, PipelineResult, ServiceError};
use crate::retry::{poll_until, Poll, PollFailure, PollPolicy};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Client-side lifecycle operations for models, endpoint configs and endpoints.
///
/// Every mutating call is a single request without retry. Endpoint state is always
/// read from the service, never cached.
#[derive(Clone)]
pub struct EndpointManager {
    service: Arc<dyn HostingService>,
    poll: PollPolicy,
}

impl EndpointManager {
    pub fn new(service: Arc<dyn HostingService>, poll: PollPolicy) -> Self {
        Self { service, poll }
    }

    /// Register a trained model archive so configs can reference it.
    pub async fn register_model(&self, name: &str, image: &str, model_data_url: &str) -> PipelineResult<ModelPackage> {
        if name.trim().is_empty() || image.trim().is_empty() || model_data_url.trim().is_empty() {
            return Err(PipelineError::InvalidArgument("model name, image and model data URL are required".to_string()));
        }
        let model = ModelPackage {
            name: name.to_string(),
            image: image.to_string(),
            model_data_url: model_data_url.to_string(),
        };
        info!(model = %name, %model_data_url, "registering model");
        self.service.create_model(&model).await.map_err(|e| PipelineError::remote("create_model", &e))?;
        Ok(model)
    }

    /// Create a named endpoint config. An existing config with the same name is a
    /// conflict even if its sizing matches.
    pub async fn create_config(
        &self,
        name: &str,
        model_id: &str,
        memory_mb: u32,
        max_concurrency: u32,
    ) -> PipelineResult<EndpointConfig> {
        if name.trim().is_empty() || model_id.trim().is_empty() {
            return Err(PipelineError::InvalidArgument("config name and model id are required".to_string()));
        }
        let config = EndpointConfig {
            name: name.to_string(),
            model_name: model_id.to_string(),
            variant_name: DEFAULT_VARIANT.to_string(),
            sizing: ServerlessSizing::new(memory_mb, max_concurrency)?,
        };

        info!(config = %name, model = %model_id, memory_mb, max_concurrency, "creating endpoint config");
        match self.service.create_endpoint_config(&config).await {
            Ok(()) => Ok(config),
            Err(ServiceError::AlreadyExists(_)) => Err(PipelineError::ConfigConflict { name: name.to_string() }),
            Err(e) => Err(PipelineError::remote("create_endpoint_config", &e)),
        }
    }

    /// Start creating an endpoint. Returns while it is still `Creating`.
    pub async fn create_endpoint(&self, name: &str, config_name: &str) -> PipelineResult<Endpoint> {
        if name.trim().is_empty() || config_name.trim().is_empty() {
            return Err(PipelineError::InvalidArgument("endpoint name and config name are required".to_string()));
        }
        info!(endpoint = %name, config = %config_name, "creating endpoint");
        self.service.create_endpoint(name, config_name).await.map_err(|e| match e {
            ServiceError::AlreadyExists(_) => PipelineError::EndpointConflict { name: name.to_string() },
            other => PipelineError::remote("create_endpoint", &other),
        })
    }

    /// Redeploy an existing endpoint onto another config.
    pub async fn update_endpoint(&self, name: &str, config_name: &str) -> PipelineResult<Endpoint> {
        info!(endpoint = %name, config = %config_name, "updating endpoint");
        self.service
            .update_endpoint(name, config_name)
            .await
            .map_err(|e| PipelineError::remote("update_endpoint", &e))
    }

    /// Current state of `name`. A failed endpoint always carries a failure reason.
    pub async fn describe(&self, name: &str) -> PipelineResult<Endpoint> {
        let mut endpoint =
            self.service.describe_endpoint(name).await.map_err(|e| PipelineError::remote("describe_endpoint", &e))?;
        if endpoint.status == EndpointStatus::Failed && endpoint.failure_reason.is_none() {
            endpoint.failure_reason = Some(NO_FAILURE_REASON.to_string());
        }
        debug!(endpoint = %name, status = %endpoint.status, "described endpoint");
        Ok(endpoint)
    }

    /// All endpoints, sorted by name.
    pub async fn list(&self) -> PipelineResult<Vec<EndpointSummary>> {
        let mut endpoints = self.service.list_endpoints().await.map_err(|e| PipelineError::remote("list_endpoints", &e))?;
        endpoints.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(endpoints)
    }

    pub async fn describe_config(&self, name: &str) -> PipelineResult<EndpointConfig> {
        self.service
            .describe_endpoint_config(name)
            .await
            .map_err(|e| PipelineError::remote("describe_endpoint_config", &e))
    }

    /// Begin teardown; the endpoint reports `Deleting` until the service removes it.
    pub async fn delete_endpoint(&self, name: &str) -> PipelineResult<()> {
        warn!(endpoint = %name, "deleting endpoint");
        self.service.delete_endpoint(name).await.map_err(|e| PipelineError::remote("delete_endpoint", &e))
    }

    /// Poll until the endpoint is `InService`.
    pub async fn await_in_service(&self, name: &str, cancel: &CancellationToken) -> PipelineResult<Endpoint> {
        let service = &self.service;
        let endpoint = poll_until(&self.poll, cancel, move || async move {
            service.describe_endpoint(name).await.map(|endpoint| {
                debug!(endpoint = %name, status = %endpoint.status, "polled endpoint");
                match endpoint.status {
                    EndpointStatus::InService | EndpointStatus::Failed => Poll::Ready(endpoint),
                    _ => Poll::Pending,
                }
            })
        })
        .await
        .map_err(|failure| match failure {
            PollFailure::TimedOut(waited) => PipelineError::EndpointTimeout { name: name.to_string(), waited },
            PollFailure::Cancelled => PipelineError::Cancelled,
            PollFailure::Service(e) => PipelineError::remote("describe_endpoint", &e),
        })?;

        if endpoint.status == EndpointStatus::Failed {
            return Err(PipelineError::EndpointFailed {
                name: name.to_string(),
                reason: endpoint.failure_reason.unwrap_or_else(|| NO_FAILURE_REASON.to_string()),
            });
        }
        info!(endpoint = %name, arn = %endpoint.arn, "endpoint in service");
        Ok(endpoint)
    }
}
