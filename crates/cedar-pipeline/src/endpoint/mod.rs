//! Endpoint configuration and endpoint lifecycle.

pub mod manager;
pub mod service;
pub mod types;

pub use manager::EndpointManager;
pub use service::{HostingService, InvocationService};
pub use types::{
    Endpoint, EndpointConfig, EndpointStatus, EndpointSummary, MemoryTier, ModelPackage, ServerlessSizing,
    DEFAULT_VARIANT, NO_FAILURE_REASON,
};
