//! In-process stand-in for the managed training and hosting platform.
//!
//! State transitions are driven by wall-clock time: a job submitted now completes once
//! `training_duration` has elapsed, an endpoint created now is in service once
//! `endpoint_provisioning` has elapsed. With a state file the platform survives process
//! restarts, so `describe` in a later invocation sees what `create` started.

use crate::endpoint::service::{HostingService, InvocationService};
use crate::endpoint::types::{Endpoint, EndpointConfig, EndpointStatus, EndpointSummary, ModelPackage};
use crate::error::{PipelineResult, ServiceError};
use crate::retry::millis;
use crate::training::job::{TrainingJob, TrainingJobId, TrainingJobSpec, TrainingJobStatus};
use crate::training::service::TrainingService;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Timing and failure injection for the simulated platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationProfile {
    #[serde(with = "millis")]
    pub training_duration: Duration,
    #[serde(with = "millis")]
    pub endpoint_provisioning: Duration,
    /// Fail every training job with this reason.
    pub training_failure: Option<String>,
    /// Fail every endpoint creation. An empty string fails without a reason.
    pub endpoint_failure: Option<String>,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            training_duration: Duration::from_secs(3),
            endpoint_provisioning: Duration::from_secs(2),
            training_failure: None,
            endpoint_failure: None,
        }
    }
}

impl SimulationProfile {
    /// Every transition happens on the next observation.
    #[must_use]
    pub fn instant() -> Self {
        Self { training_duration: Duration::ZERO, endpoint_provisioning: Duration::ZERO, ..Self::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SimulatedJob {
    spec: TrainingJobSpec,
    submitted_at: DateTime<Utc>,
    /// When the job leaves `InProgress`.
    settles_at: DateTime<Utc>,
    /// Terminal record, fixed once the job settles.
    outcome: Option<TrainingJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SimulatedEndpoint {
    endpoint: Endpoint,
    /// When the current transitional status resolves.
    settles_at: DateTime<Utc>,
    /// Config that becomes active when an update settles.
    pending_config: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PlatformState {
    jobs: BTreeMap<String, SimulatedJob>,
    models: BTreeMap<String, ModelPackage>,
    configs: BTreeMap<String, EndpointConfig>,
    endpoints: BTreeMap<String, SimulatedEndpoint>,
}

/// Simulated training, hosting and invocation services sharing one state.
pub struct SimulatedPlatform {
    profile: SimulationProfile,
    state: Mutex<PlatformState>,
    state_path: Option<PathBuf>,
}

impl SimulatedPlatform {
    #[must_use]
    pub fn in_memory(profile: SimulationProfile) -> Self {
        Self { profile, state: Mutex::new(PlatformState::default()), state_path: None }
    }

    /// Load state from `path` if it exists; every mutation is written back to it.
    pub fn persistent(path: &Path, profile: SimulationProfile) -> PipelineResult<Self> {
        let state = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw)?
        } else {
            PlatformState::default()
        };
        Ok(Self { profile, state: Mutex::new(state), state_path: Some(path.to_path_buf()) })
    }

    /// Lock the state, first picking up changes another process wrote to the state file.
    fn lock(&self) -> Result<MutexGuard<'_, PlatformState>, ServiceError> {
        let mut state =
            self.state.lock().map_err(|_| ServiceError::Internal("platform state lock poisoned".to_string()))?;
        if let Some(path) = self.state_path.as_ref().filter(|p| p.exists()) {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| ServiceError::Internal(format!("failed to read platform state: {e}")))?;
            *state = serde_json::from_str(&raw)
                .map_err(|e| ServiceError::Internal(format!("corrupt platform state: {e}")))?;
        }
        Ok(state)
    }

    fn save(&self, state: &PlatformState) -> Result<(), ServiceError> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_vec_pretty(state).map_err(std::io::Error::other)?;
            let tmp = path.with_extension("json.partial");
            std::fs::write(&tmp, json)?;
            std::fs::rename(&tmp, path)
        };
        write().map_err(|e| ServiceError::Internal(format!("failed to persist platform state: {e}")))
    }

    fn after(&self, now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
        now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
    }

    /// Resolve training jobs and transitional endpoint statuses whose time has come.
    fn settle(&self, state: &mut PlatformState, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        for (id, sim) in &mut state.jobs {
            if sim.outcome.is_some() || now < sim.settles_at {
                continue;
            }
            changed = true;
            let job_id = TrainingJobId(id.clone());
            let job = match &self.profile.training_failure {
                Some(reason) => TrainingJob {
                    job_id,
                    status: TrainingJobStatus::Failed,
                    failure_reason: Some(reason.clone()),
                    model_artifact: None,
                },
                None => TrainingJob {
                    model_artifact: Some(format!(
                        "{}/{job_id}/output/model.tar.gz",
                        sim.spec.output_path.trim_end_matches('/')
                    )),
                    job_id,
                    status: TrainingJobStatus::Completed,
                    failure_reason: None,
                },
            };
            debug!(job = %job.job_id, status = %job.status, "simulated training job settled");
            sim.outcome = Some(job);
        }
        let mut removed = Vec::new();
        for (name, sim) in &mut state.endpoints {
            if !sim.endpoint.status.is_transitional() || now < sim.settles_at {
                continue;
            }
            changed = true;
            match sim.endpoint.status {
                EndpointStatus::Creating => match &self.profile.endpoint_failure {
                    Some(reason) => {
                        sim.endpoint.status = EndpointStatus::Failed;
                        sim.endpoint.failure_reason = (!reason.is_empty()).then(|| reason.clone());
                    }
                    None => sim.endpoint.status = EndpointStatus::InService,
                },
                EndpointStatus::Updating => {
                    if let Some(config) = sim.pending_config.take() {
                        sim.endpoint.config_name = config;
                    }
                    sim.endpoint.status = EndpointStatus::InService;
                }
                _ => removed.push(name.clone()),
            }
            sim.endpoint.last_modified_at = sim.settles_at;
        }
        for name in removed {
            debug!(endpoint = %name, "simulated endpoint removed");
            state.endpoints.remove(&name);
        }
        changed
    }

    /// Settle, persisting if anything moved, and run `read` against the result.
    fn observe<T>(&self, read: impl FnOnce(&PlatformState) -> Result<T, ServiceError>) -> Result<T, ServiceError> {
        let mut state = self.lock()?;
        if self.settle(&mut state, Utc::now()) {
            self.save(&state)?;
        }
        read(&state)
    }

    fn mutate<T>(&self, change: impl FnOnce(&mut PlatformState, DateTime<Utc>) -> Result<T, ServiceError>) -> Result<T, ServiceError> {
        let mut state = self.lock()?;
        let now = Utc::now();
        self.settle(&mut state, now);
        let value = change(&mut state, now)?;
        self.save(&state)?;
        Ok(value)
    }

    fn score(record: &str) -> f64 {
        let values: Vec<f64> = record.split(',').filter_map(|v| v.trim().parse::<f64>().ok()).collect();
        if values.is_empty() {
            return 0.5;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        1.0 / (1.0 + (-mean / 100.0).exp())
    }
}

#[async_trait]
impl TrainingService for SimulatedPlatform {
    async fn create_training_job(&self, spec: &TrainingJobSpec) -> Result<TrainingJobId, ServiceError> {
        self.mutate(|state, now| {
            if state.jobs.contains_key(&spec.job_id.0) {
                return Err(ServiceError::AlreadyExists(format!("training job {}", spec.job_id)));
            }
            let settles_at = self.after(now, self.profile.training_duration);
            let job = SimulatedJob { spec: spec.clone(), submitted_at: now, settles_at, outcome: None };
            state.jobs.insert(spec.job_id.0.clone(), job);
            Ok(spec.job_id.clone())
        })
    }

    async fn describe_training_job(&self, job_id: &TrainingJobId) -> Result<TrainingJob, ServiceError> {
        self.observe(|state| {
            let sim = state.jobs.get(&job_id.0).ok_or_else(|| ServiceError::NotFound(format!("training job {job_id}")))?;
            Ok(sim.outcome.clone().unwrap_or_else(|| TrainingJob {
                job_id: job_id.clone(),
                status: TrainingJobStatus::InProgress,
                failure_reason: None,
                model_artifact: None,
            }))
        })
    }
}

#[async_trait]
impl HostingService for SimulatedPlatform {
    async fn create_model(&self, model: &ModelPackage) -> Result<(), ServiceError> {
        self.mutate(|state, _| {
            if state.models.contains_key(&model.name) {
                return Err(ServiceError::AlreadyExists(format!("model {}", model.name)));
            }
            state.models.insert(model.name.clone(), model.clone());
            Ok(())
        })
    }

    async fn create_endpoint_config(&self, config: &EndpointConfig) -> Result<(), ServiceError> {
        self.mutate(|state, _| {
            if state.configs.contains_key(&config.name) {
                return Err(ServiceError::AlreadyExists(format!("endpoint config {}", config.name)));
            }
            if !state.models.contains_key(&config.model_name) {
                return Err(ServiceError::Validation(format!("could not find model {}", config.model_name)));
            }
            state.configs.insert(config.name.clone(), config.clone());
            Ok(())
        })
    }

    async fn describe_endpoint_config(&self, name: &str) -> Result<EndpointConfig, ServiceError> {
        self.observe(|state| {
            state.configs.get(name).cloned().ok_or_else(|| ServiceError::NotFound(format!("endpoint config {name}")))
        })
    }

    async fn create_endpoint(&self, name: &str, config_name: &str) -> Result<Endpoint, ServiceError> {
        self.mutate(|state, now| {
            if state.endpoints.contains_key(name) {
                return Err(ServiceError::AlreadyExists(format!("endpoint {name}")));
            }
            if !state.configs.contains_key(config_name) {
                return Err(ServiceError::Validation(format!("could not find endpoint config {config_name}")));
            }
            let endpoint = Endpoint {
                name: name.to_string(),
                arn: format!("arn:aws:sagemaker:local:000000000000:endpoint/{}", name.to_lowercase()),
                config_name: config_name.to_string(),
                status: EndpointStatus::Creating,
                failure_reason: None,
                created_at: now,
                last_modified_at: now,
            };
            let settles_at = self.after(now, self.profile.endpoint_provisioning);
            state
                .endpoints
                .insert(name.to_string(), SimulatedEndpoint { endpoint: endpoint.clone(), settles_at, pending_config: None });
            Ok(endpoint)
        })
    }

    async fn update_endpoint(&self, name: &str, config_name: &str) -> Result<Endpoint, ServiceError> {
        self.mutate(|state, now| {
            if !state.configs.contains_key(config_name) {
                return Err(ServiceError::Validation(format!("could not find endpoint config {config_name}")));
            }
            let sim = state.endpoints.get_mut(name).ok_or_else(|| ServiceError::NotFound(format!("endpoint {name}")))?;
            if sim.endpoint.status != EndpointStatus::InService {
                return Err(ServiceError::Validation(format!(
                    "cannot update endpoint {name} while it is {}",
                    sim.endpoint.status
                )));
            }
            sim.endpoint.status = EndpointStatus::Updating;
            sim.endpoint.last_modified_at = now;
            sim.pending_config = Some(config_name.to_string());
            sim.settles_at = self.after(now, self.profile.endpoint_provisioning);
            Ok(sim.endpoint.clone())
        })
    }

    async fn describe_endpoint(&self, name: &str) -> Result<Endpoint, ServiceError> {
        self.observe(|state| {
            state
                .endpoints
                .get(name)
                .map(|sim| sim.endpoint.clone())
                .ok_or_else(|| ServiceError::NotFound(format!("endpoint {name}")))
        })
    }

    async fn list_endpoints(&self) -> Result<Vec<EndpointSummary>, ServiceError> {
        self.observe(|state| {
            Ok(state
                .endpoints
                .values()
                .map(|sim| EndpointSummary { name: sim.endpoint.name.clone(), status: sim.endpoint.status })
                .collect())
        })
    }

    async fn delete_endpoint(&self, name: &str) -> Result<(), ServiceError> {
        self.mutate(|state, now| {
            let sim = state.endpoints.get_mut(name).ok_or_else(|| ServiceError::NotFound(format!("endpoint {name}")))?;
            if sim.endpoint.status == EndpointStatus::Deleting {
                return Ok(());
            }
            sim.endpoint.status = EndpointStatus::Deleting;
            sim.endpoint.last_modified_at = now;
            sim.pending_config = None;
            sim.settles_at = self.after(now, self.profile.endpoint_provisioning);
            Ok(())
        })
    }
}

#[async_trait]
impl InvocationService for SimulatedPlatform {
    async fn invoke_endpoint(&self, name: &str, content_type: &str, body: Vec<u8>) -> Result<Vec<u8>, ServiceError> {
        let status = self.observe(|state| {
            state
                .endpoints
                .get(name)
                .map(|sim| sim.endpoint.status)
                .ok_or_else(|| ServiceError::NotFound(format!("endpoint {name}")))
        })?;
        if status != EndpointStatus::InService {
            return Err(ServiceError::Validation(format!("endpoint {name} is {status}, not InService")));
        }
        if content_type != "text/csv" {
            return Err(ServiceError::Validation(format!("unsupported content type {content_type}")));
        }
        let text = String::from_utf8(body).map_err(|_| ServiceError::Validation("body is not UTF-8".to_string()))?;
        let scores: Vec<String> =
            text.lines().filter(|l| !l.trim().is_empty()).map(|l| Self::score(l).to_string()).collect();
        if scores.is_empty() {
            return Err(ServiceError::Validation("empty request body".to_string()));
        }
        Ok(scores.join("\n").into_bytes())
    }
}
