use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Pipeline stage names used in progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Prepare,
    Stage,
    Train,
    RegisterModel,
    CreateConfig,
    CreateEndpoint,
    AwaitEndpoint,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Prepare => "prepare",
            Self::Stage => "stage",
            Self::Train => "train",
            Self::RegisterModel => "register-model",
            Self::CreateConfig => "create-config",
            Self::CreateEndpoint => "create-endpoint",
            Self::AwaitEndpoint => "await-endpoint",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    StageStarted { stage: Stage, message: String },
    StageFinished { stage: Stage, message: String },
    Message { message: String },
    RowSucceeded { row: usize, status: u16, body: String },
    RowFailed { row: usize, error: String },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

#[derive(Debug, Default)]
pub struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::StageStarted { stage, message } => println!("[{stage}] {message}"),
            ProgressEvent::StageFinished { stage, message } => println!("[{stage}] done: {message}"),
            ProgressEvent::Message { message } => println!("{message}"),
            ProgressEvent::RowSucceeded { row, status, body } => {
                println!("Row {row} Response: {status}");
                println!("{body}");
            }
            ProgressEvent::RowFailed { row, error } => println!("Error on row {row}: {error}"),
        }
    }
}

/// Forwards events to `tracing` instead of stdout.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::StageStarted { stage, message } => tracing::info!(%stage, "{message}"),
            ProgressEvent::StageFinished { stage, message } => tracing::info!(%stage, "finished: {message}"),
            ProgressEvent::Message { message } => tracing::info!("{message}"),
            ProgressEvent::RowSucceeded { row, status, .. } => tracing::info!(row, status, "row succeeded"),
            ProgressEvent::RowFailed { row, error } => tracing::warn!(row, %error, "row failed"),
        }
    }
}

/// Keeps every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgressSink {
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ProgressSink for RecordingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
