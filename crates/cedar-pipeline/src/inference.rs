//! Batch inference against a deployed HTTP prediction endpoint.
//!
//! Each dataset row becomes one `GET` whose query string carries the whole row. Rows
//! are isolated: a failure on one row is recorded in its outcome and the batch moves on.

use crate::dataset::{Dataset, Row};
use crate::error::{PipelineError, PipelineResult};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::retry::{millis, RetryPolicy};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Trim a column header and replace inner spaces with `connector`.
#[must_use]
pub fn normalize_column_name(raw: &str, connector: &str) -> String {
    raw.trim().replace(' ', connector)
}

/// Query parameters for one row, in schema order.
///
/// When several headers normalize to the same name the first column wins; the later
/// ones are not sent.
#[must_use]
pub fn row_params(columns: &[String], row: &Row, connector: &str) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    columns
        .iter()
        .zip(&row.values)
        .filter_map(|(column, value)| {
            let name = normalize_column_name(column, connector);
            seen.insert(name.clone()).then(|| (name, value.to_string()))
        })
        .collect()
}

/// Headers that [`row_params`] drops because an earlier column took their name.
fn shadowed_columns(columns: &[String], connector: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    columns.iter().filter(|column| !seen.insert(normalize_column_name(column, connector))).cloned().collect()
}

/// A successful endpoint reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Why a single row produced no usable response.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InferenceRowError {
    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("status {status} with a body that is not JSON: {message}")]
    MalformedBody { status: u16, message: String },
}

impl InferenceRowError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowOutcome {
    pub row_index: usize,
    pub result: Result<InferenceResponse, InferenceRowError>,
}

/// One outcome per input row, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<RowOutcome>,
}

impl BatchReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceOptions {
    /// Replaces spaces in column names when building parameter keys.
    pub connector: String,
    /// Rows in flight at once. `1` sends rows strictly one after another.
    pub concurrency: usize,
    #[serde(with = "millis")]
    pub request_timeout: Duration,
    /// Applied to transport errors only.
    pub retry: RetryPolicy,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            connector: "_".to_string(),
            concurrency: 1,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// HTTP client that runs one inference call per dataset row.
#[derive(Clone)]
pub struct BatchInferenceClient {
    client: Client,
    options: InferenceOptions,
}

impl BatchInferenceClient {
    pub fn new(options: InferenceOptions) -> PipelineResult<Self> {
        if options.concurrency == 0 {
            return Err(PipelineError::InvalidArgument("inference concurrency must be >= 1".to_string()));
        }
        let client = Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| PipelineError::InvalidArgument(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, options })
    }

    /// Call `endpoint_url` once per row of `dataset`.
    ///
    /// Never fails as a whole: every row gets exactly one [`RowOutcome`], and the
    /// report keeps the dataset's row order even when rows run concurrently.
    pub async fn run_batch(&self, endpoint_url: &str, dataset: &Dataset, sink: &dyn ProgressSink) -> BatchReport {
        info!(endpoint_url, rows = dataset.len(), concurrency = self.options.concurrency, "starting batch inference");

        let columns = dataset.columns();
        let shadowed = shadowed_columns(columns, &self.options.connector);
        if !shadowed.is_empty() {
            warn!(?shadowed, "columns share a normalized name with an earlier column and are not sent");
        }
        let mut outcomes = stream::iter(dataset.rows())
            .map(|row| async move {
                let params = row_params(columns, row, &self.options.connector);
                let result = self
                    .options
                    .retry
                    .run("invoke_row", InferenceRowError::is_transient, || self.invoke(endpoint_url, &params))
                    .await;
                RowOutcome { row_index: row.index, result }
            })
            .buffered(self.options.concurrency);

        let mut report = BatchReport { outcomes: Vec::with_capacity(dataset.len()) };
        while let Some(outcome) = outcomes.next().await {
            let event = match &outcome.result {
                Ok(response) => ProgressEvent::RowSucceeded {
                    row: outcome.row_index,
                    status: response.status,
                    body: response.body.to_string(),
                },
                Err(error) => ProgressEvent::RowFailed { row: outcome.row_index, error: error.to_string() },
            };
            sink.on_event(event);
            report.outcomes.push(outcome);
        }

        info!(succeeded = report.succeeded(), failed = report.failed(), "batch inference finished");
        report
    }

    async fn invoke(&self, url: &str, params: &[(String, String)]) -> Result<InferenceResponse, InferenceRowError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| InferenceRowError::Transport { message: e.to_string() })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| InferenceRowError::Transport { message: e.to_string() })?;
        debug!(status = status.as_u16(), bytes = text.len(), "row response");

        if !status.is_success() {
            return Err(InferenceRowError::Status { status: status.as_u16(), body: text });
        }
        serde_json::from_str(&text)
            .map(|body| InferenceResponse { status: status.as_u16(), body })
            .map_err(|e| InferenceRowError::MalformedBody { status: status.as_u16(), message: e.to_string() })
    }
}
