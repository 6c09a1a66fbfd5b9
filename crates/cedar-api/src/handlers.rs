//! Request routing for the prediction proxy.

use crate::config::{ApiConfig, FeatureSpec};
use crate::metrics::RequestCounter;
use cedar_pipeline::InvocationService;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{header, Method, Response, StatusCode};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared state behind every connection.
pub struct ApiState {
    pub config: ApiConfig,
    pub invoker: Arc<dyn InvocationService>,
    pub metrics: RequestCounter,
}

impl ApiState {
    pub fn new(config: ApiConfig, invoker: Arc<dyn InvocationService>) -> Self {
        Self { config, invoker, metrics: RequestCounter::new() }
    }
}

/// Decode `a=1&b=2` into pairs. A key without `=` maps to an empty value.
#[must_use]
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            Some((decode_component(key)?, decode_component(value)?))
        })
        .collect()
}

fn decode_component(raw: &str) -> Option<String> {
    urlencoding::decode(&raw.replace('+', " ")).ok().map(std::borrow::Cow::into_owned)
}

/// Values in feature order; features the request omits take their default.
#[must_use]
pub fn build_record(features: &[FeatureSpec], provided: &HashMap<String, String>) -> Vec<String> {
    features.iter().map(|f| provided.get(&f.name).cloned().unwrap_or_else(|| f.default.clone())).collect()
}

fn csv_line(record: &[String]) -> Result<Vec<u8>, String> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record(record).map_err(|e| e.to_string())?;
    writer.into_inner().map_err(|e| e.to_string())
}

fn text(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(format!("{message}\n"))));
    *response.status_mut() = status;
    response.headers_mut().insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

fn json_body(status: StatusCode, value: &serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(value.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
    response
}

/// Route one request. Never fails: every error becomes an HTTP status.
pub async fn handle(
    state: &ApiState,
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
) -> Response<Full<Bytes>> {
    match (path, method) {
        ("/status", &Method::GET) => {
            state.metrics.increment(path, method.as_str());
            json_body(StatusCode::OK, &json!({ "code": "200" }))
        }
        ("/predict", &Method::GET) => {
            state.metrics.increment(path, method.as_str());
            let pairs = parse_query(query.unwrap_or_default());
            if pairs.is_empty() {
                return text(StatusCode::BAD_REQUEST, "Missing query parameters");
            }
            let mut provided = HashMap::new();
            for (key, value) in pairs {
                provided.entry(key).or_insert(value);
            }
            predict(state, &provided).await
        }
        ("/predict/json", &Method::GET | &Method::POST) => {
            state.metrics.increment(path, method.as_str());
            match serde_json::from_slice::<HashMap<String, String>>(body) {
                Ok(provided) if !provided.is_empty() => predict(state, &provided).await,
                _ => text(StatusCode::BAD_REQUEST, "Missing JSON fields"),
            }
        }
        ("/metrics", &Method::GET) => {
            let mut response = Response::new(Full::new(Bytes::from(state.metrics.export())));
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/plain; version=0.0.4"));
            response
        }
        ("/status" | "/predict" | "/predict/json" | "/metrics", _) => {
            text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
        }
        _ => text(StatusCode::NOT_FOUND, "Not found"),
    }
}

async fn predict(state: &ApiState, provided: &HashMap<String, String>) -> Response<Full<Bytes>> {
    let record = build_record(&state.config.features, provided);
    debug!(?record, "built prediction record");
    let line = match csv_line(&record) {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, "failed to encode record");
            return text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to write CSV data");
        }
    };

    let reply = state.invoker.invoke_endpoint(&state.config.endpoint_name, &state.config.content_type, line).await;
    match reply {
        Err(e) => {
            warn!(endpoint = %state.config.endpoint_name, error = %e, "endpoint invocation failed");
            text(StatusCode::INTERNAL_SERVER_ERROR, &format!("Failed to call endpoint: {e}"))
        }
        Ok(bytes) if bytes.is_empty() => text(StatusCode::INTERNAL_SERVER_ERROR, "Empty response from endpoint"),
        Ok(bytes) => {
            let prediction = String::from_utf8_lossy(&bytes).into_owned();
            json_body(StatusCode::OK, &json!({ "prediction": prediction }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cedar_pipeline::ServiceError;
    use http_body_util::BodyExt;
    use std::sync::Mutex;

    /// Records request bodies and answers with a fixed reply.
    struct StubInvoker {
        bodies: Mutex<Vec<String>>,
        reply: Result<Vec<u8>, ServiceError>,
    }

    impl StubInvoker {
        fn replying(reply: Result<Vec<u8>, ServiceError>) -> Arc<Self> {
            Arc::new(Self { bodies: Mutex::new(Vec::new()), reply })
        }
    }

    #[async_trait]
    impl InvocationService for StubInvoker {
        async fn invoke_endpoint(&self, _name: &str, _content_type: &str, body: Vec<u8>) -> Result<Vec<u8>, ServiceError> {
            self.bodies.lock().unwrap().push(String::from_utf8(body).unwrap());
            self.reply.clone()
        }
    }

    fn small_config() -> ApiConfig {
        ApiConfig {
            features: vec![
                FeatureSpec { name: "mean_radius".to_string(), default: "13.3".to_string() },
                FeatureSpec { name: "mean_texture".to_string(), default: "18.68".to_string() },
                FeatureSpec { name: "mean_area".to_string(), default: "551.7".to_string() },
            ],
            ..ApiConfig::default()
        }
    }

    async fn body_text(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_parse_query_decodes() {
        assert_eq!(
            parse_query("mean_radius=17.99&note=a+b%2Fc&flag"),
            vec![
                ("mean_radius".to_string(), "17.99".to_string()),
                ("note".to_string(), "a b/c".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
        assert!(parse_query("").is_empty());
    }

    #[tokio::test]
    async fn test_status() {
        let state = ApiState::new(small_config(), StubInvoker::replying(Ok(b"0.1".to_vec())));
        let response = handle(&state, &Method::GET, "/status", None, b"").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, r#"{"code":"200"}"#);
    }

    #[tokio::test]
    async fn test_predict_fills_defaults_in_feature_order() {
        let invoker = StubInvoker::replying(Ok(b"0.9731".to_vec()));
        let state = ApiState::new(small_config(), invoker.clone());

        let response = handle(&state, &Method::GET, "/predict", Some("mean_area=1001.0&unused=5"), b"").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["prediction"], "0.9731");
        assert_eq!(invoker.bodies.lock().unwrap().as_slice(), ["13.3,18.68,1001.0\n"]);
        assert_eq!(state.metrics.get("/predict", "GET"), 1);
    }

    #[tokio::test]
    async fn test_predict_without_params_is_bad_request() {
        let invoker = StubInvoker::replying(Ok(b"1".to_vec()));
        let state = ApiState::new(small_config(), invoker.clone());
        let response = handle(&state, &Method::GET, "/predict", None, b"").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(invoker.bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_predict_json() {
        let invoker = StubInvoker::replying(Ok(b"0.02".to_vec()));
        let state = ApiState::new(small_config(), invoker.clone());

        let response =
            handle(&state, &Method::POST, "/predict/json", None, br#"{"mean_texture": "10.38"}"#).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(invoker.bodies.lock().unwrap().as_slice(), ["13.3,10.38,551.7\n"]);

        let bad_bodies: [&[u8]; 4] = [b"", b"{}", b"[1,2]", br#"{"mean_area": 3}"#];
        for bad in bad_bodies {
            let response = handle(&state, &Method::GET, "/predict/json", None, bad).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_invocation_failures_are_server_errors() {
        let state = ApiState::new(
            small_config(),
            StubInvoker::replying(Err(ServiceError::Validation("endpoint is Creating".to_string()))),
        );
        let response = handle(&state, &Method::GET, "/predict", Some("mean_radius=1"), b"").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("endpoint is Creating"));

        let state = ApiState::new(small_config(), StubInvoker::replying(Ok(Vec::new())));
        let response = handle(&state, &Method::GET, "/predict", Some("mean_radius=1"), b"").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_routing_errors_and_metrics() {
        let state = ApiState::new(small_config(), StubInvoker::replying(Ok(b"1".to_vec())));
        assert_eq!(handle(&state, &Method::GET, "/nope", None, b"").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            handle(&state, &Method::DELETE, "/status", None, b"").await.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );

        handle(&state, &Method::GET, "/status", None, b"").await;
        let metrics = body_text(handle(&state, &Method::GET, "/metrics", None, b"").await).await;
        assert!(metrics.contains("requests_total{method=\"/status - GET\"} 1"));
    }
}
