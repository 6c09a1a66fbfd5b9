use crate::error::{PipelineError, PipelineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Text returned by `describe` for a failed endpoint whose service gave no reason.
pub const NO_FAILURE_REASON: &str = "No failure reason provided.";

/// Default production variant name.
pub const DEFAULT_VARIANT: &str = "AllTraffic";

/// Highest concurrency a serverless variant accepts.
pub const MAX_CONCURRENCY_LIMIT: u32 = 200;

/// Platform sizing tiers for serverless memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum MemoryTier {
    Mb1024,
    Mb2048,
    Mb3072,
    Mb4096,
    Mb5120,
    Mb6144,
}

impl MemoryTier {
    pub const ALL: [Self; 6] = [Self::Mb1024, Self::Mb2048, Self::Mb3072, Self::Mb4096, Self::Mb5120, Self::Mb6144];

    #[must_use]
    pub fn megabytes(self) -> u32 {
        match self {
            Self::Mb1024 => 1024,
            Self::Mb2048 => 2048,
            Self::Mb3072 => 3072,
            Self::Mb4096 => 4096,
            Self::Mb5120 => 5120,
            Self::Mb6144 => 6144,
        }
    }

    pub fn from_megabytes(mb: u32) -> PipelineResult<Self> {
        Self::ALL.into_iter().find(|t| t.megabytes() == mb).ok_or_else(|| {
            let allowed: Vec<String> = Self::ALL.iter().map(|t| t.megabytes().to_string()).collect();
            PipelineError::InvalidArgument(format!("memory_mb must be one of {}, got {mb}", allowed.join(", ")))
        })
    }
}

impl TryFrom<u32> for MemoryTier {
    type Error = String;

    fn try_from(mb: u32) -> Result<Self, Self::Error> {
        Self::from_megabytes(mb).map_err(|e| e.to_string())
    }
}

impl From<MemoryTier> for u32 {
    fn from(tier: MemoryTier) -> Self {
        tier.megabytes()
    }
}

/// Serverless sizing of a production variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerlessSizing {
    pub memory: MemoryTier,
    pub max_concurrency: u32,
}

impl ServerlessSizing {
    pub fn new(memory_mb: u32, max_concurrency: u32) -> PipelineResult<Self> {
        let memory = MemoryTier::from_megabytes(memory_mb)?;
        if max_concurrency == 0 || max_concurrency > MAX_CONCURRENCY_LIMIT {
            return Err(PipelineError::InvalidArgument(format!(
                "max_concurrency must be in 1..={MAX_CONCURRENCY_LIMIT}, got {max_concurrency}"
            )));
        }
        Ok(Self { memory, max_concurrency })
    }
}

/// A trained model registered for hosting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPackage {
    pub name: String,
    pub image: String,
    pub model_data_url: String,
}

/// Named, immutable binding of a model to a sized serving variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub model_name: String,
    pub variant_name: String,
    pub sizing: ServerlessSizing,
}

/// Endpoint status as reported by the hosting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointStatus {
    Creating,
    InService,
    Updating,
    Failed,
    Deleting,
}

impl EndpointStatus {
    #[must_use]
    pub fn is_transitional(self) -> bool {
        matches!(self, Self::Creating | Self::Updating | Self::Deleting)
    }
}

impl std::fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Creating => "Creating",
            Self::InService => "InService",
            Self::Updating => "Updating",
            Self::Failed => "Failed",
            Self::Deleting => "Deleting",
        };
        f.write_str(s)
    }
}

/// Observed state of a hosted endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub arn: String,
    pub config_name: String,
    pub status: EndpointStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSummary {
    pub name: String,
    pub status: EndpointStatus,
}
