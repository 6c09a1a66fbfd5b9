use crate::endpoint::types::{Endpoint, EndpointConfig, EndpointSummary, ModelPackage};
use crate::error::ServiceError;
use async_trait::async_trait;

/// Remote model-hosting control plane.
///
/// Endpoints are created asynchronously: `create_endpoint` and `update_endpoint`
/// return while the service is still provisioning.
#[async_trait]
pub trait HostingService: Send + Sync {
    async fn create_model(&self, model: &ModelPackage) -> Result<(), ServiceError>;

    /// Fails with [`ServiceError::AlreadyExists`] when the name is taken.
    async fn create_endpoint_config(&self, config: &EndpointConfig) -> Result<(), ServiceError>;

    async fn describe_endpoint_config(&self, name: &str) -> Result<EndpointConfig, ServiceError>;

    async fn create_endpoint(&self, name: &str, config_name: &str) -> Result<Endpoint, ServiceError>;

    async fn update_endpoint(&self, name: &str, config_name: &str) -> Result<Endpoint, ServiceError>;

    async fn describe_endpoint(&self, name: &str) -> Result<Endpoint, ServiceError>;

    async fn list_endpoints(&self) -> Result<Vec<EndpointSummary>, ServiceError>;

    async fn delete_endpoint(&self, name: &str) -> Result<(), ServiceError>;
}

/// Runtime invocation of a hosted endpoint.
#[async_trait]
pub trait InvocationService: Send + Sync {
    async fn invoke_endpoint(&self, name: &str, content_type: &str, body: Vec<u8>) -> Result<Vec<u8>, ServiceError>;
}
