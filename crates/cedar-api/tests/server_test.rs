//! The proxy served over a real socket against the simulated platform.

use cedar_api::{ApiConfig, ApiState, FeatureSpec, PredictionServer};
use cedar_pipeline::{
    CancellationToken, EndpointManager, PollPolicy, SimulatedPlatform, SimulationProfile,
};
use std::sync::Arc;

async fn deployed_platform() -> Arc<SimulatedPlatform> {
    let platform = Arc::new(SimulatedPlatform::in_memory(SimulationProfile::instant()));
    let manager = EndpointManager::new(platform.clone(), PollPolicy::default());
    manager.register_model("model", "xgboost:1.5-1", "s3://bucket/model.tar.gz").await.unwrap();
    manager.create_config("cfg", "model", 1024, 2).await.unwrap();
    manager.create_endpoint("ep", "cfg").await.unwrap();
    platform
}

async fn start(platform: Arc<SimulatedPlatform>) -> (String, CancellationToken) {
    let config = ApiConfig {
        address: "127.0.0.1:0".to_string(),
        endpoint_name: "ep".to_string(),
        features: vec![
            FeatureSpec { name: "a".to_string(), default: "0".to_string() },
            FeatureSpec { name: "b".to_string(), default: "0".to_string() },
        ],
        ..ApiConfig::default()
    };
    let server = PredictionServer::bind(ApiState::new(config, platform)).await.unwrap();
    let base = format!("http://{}", server.local_addr().unwrap());
    let shutdown = CancellationToken::new();
    tokio::spawn(server.serve(shutdown.clone()));
    (base, shutdown)
}

#[tokio::test]
async fn test_status_predict_and_metrics_over_http() {
    let (base, shutdown) = start(deployed_platform().await).await;
    let client = reqwest::Client::new();

    let status: serde_json::Value = client.get(format!("{base}/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status, serde_json::json!({ "code": "200" }));

    let response = client.get(format!("{base}/predict?a=0&b=0")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["prediction"], "0.5");

    let response = client.post(format!("{base}/predict/json")).body(r#"{"a": "0"}"#).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let response = client.get(format!("{base}/predict")).send().await.unwrap();
    assert_eq!(response.status(), 400);

    let metrics = client.get(format!("{base}/metrics")).send().await.unwrap().text().await.unwrap();
    assert!(metrics.contains("requests_total{method=\"/predict - GET\"} 2"));
    assert!(metrics.contains("requests_total{method=\"/predict/json - POST\"} 1"));

    shutdown.cancel();
}

#[tokio::test]
async fn test_unknown_endpoint_is_server_error() {
    let platform = Arc::new(SimulatedPlatform::in_memory(SimulationProfile::instant()));
    let (base, shutdown) = start(platform).await;

    let response = reqwest::get(format!("{base}/predict?a=1")).await.unwrap();
    assert_eq!(response.status(), 500);
    assert!(response.text().await.unwrap().contains("endpoint ep"));

    shutdown.cancel();
}
