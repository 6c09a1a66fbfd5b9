//! Prediction proxy
//!
//! Accepts feature values over HTTP, completes them with configured defaults, and
//! invokes a hosted endpoint with a single delimited-text record.

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod server;

pub use config::{ApiConfig, ApiError, ApiResult, FeatureSpec};
pub use handlers::{build_record, handle, parse_query, ApiState};
pub use metrics::RequestCounter;
pub use server::PredictionServer;
