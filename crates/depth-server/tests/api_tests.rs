//! Integration tests for the depth-server API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use depth_core::{
    health::{components, HealthRegistry},
    observability::DepthMetrics,
    FEATURE_NAMES,
};
use depth_server::{create_router, AppState, ServerConfig};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const COUNTER: &str = r#"
module counter(input clk, input rst, input en, output reg [3:0] count, output wrap);
  wire [3:0] next = count + 4'd1;
  assign wrap = en & (count == 4'hF);
  always @(posedge clk) begin
    if (rst) count <= 4'd0;
    else if (en) count <= next;
  end
endmodule
"#;

/// Extractor-schema table where depth follows structural_depth
fn write_training_csv(path: &Path, rows: u32) {
    let depth_col = FEATURE_NAMES
        .iter()
        .position(|n| *n == "structural_depth")
        .unwrap();
    let mut text = format!("signal,{},depth\n", FEATURE_NAMES.join(","));
    for i in 0..rows {
        let depth = i % 9;
        let cells: Vec<String> = (0..FEATURE_NAMES.len())
            .map(|j| {
                if j == depth_col {
                    depth.to_string()
                } else {
                    ((i as usize * (j + 2)) % 7).to_string()
                }
            })
            .collect();
        text.push_str(&format!("s{},{},{}\n", i, cells.join(","), depth));
    }
    std::fs::write(path, text).unwrap();
}

async fn setup_test_app(dir: &Path) -> (Router, Arc<AppState>) {
    let timeout = Duration::from_secs(ServerConfig::default().training_timeout_secs);
    setup_test_app_with_timeout(dir, timeout).await
}

async fn setup_test_app_with_timeout(
    dir: &Path,
    training_timeout: Duration,
) -> (Router, Arc<AppState>) {
    let config = ServerConfig {
        model_path: dir.join("models/depth_predictor.json"),
        data_path: dir.join("data/training_data.csv"),
        test_data_path: dir.join("data/test_data.csv"),
        ..ServerConfig::default()
    };

    let health_registry = HealthRegistry::new();
    health_registry.register(components::TRAINER).await;
    let state = AppState::new(config, health_registry.clone(), DepthMetrics::new())
        .with_training_timeout(training_timeout);
    let state = Arc::new(state);
    state.load_initial_model().await;
    health_registry.set_ready(true).await;

    (create_router(state.clone()), state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn train_default(app: &Router, dir: &Path) -> Value {
    std::fs::create_dir_all(dir.join("data")).unwrap();
    write_training_csv(&dir.join("data/training_data.csv"), 80);
    let (status, body) = send(app, "POST", "/api/v1/train", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body
}

#[tokio::test]
async fn test_healthz_degraded_without_model() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = setup_test_app(dir.path()).await;

    let (status, health) = send(&app, "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["model"]["message"], "no model loaded");
}

#[tokio::test]
async fn test_readyz_ready_after_startup() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = setup_test_app(dir.path()).await;

    let (status, readiness) = send(&app, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_fails_when_unhealthy() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = setup_test_app(dir.path()).await;
    state
        .health_registry
        .set_unhealthy(components::TRAINER, "worker lost")
        .await;

    let (status, _) = send(&app, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let (status, _) = send(&app, "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_predict_without_model_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = setup_test_app(dir.path()).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/predict",
        Some(json!({ "rtl_source": COUNTER, "signal": "wrap" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "no_model");

    let (status, _) = send(&app, "GET", "/api/v1/model", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_train_then_predict() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = setup_test_app(dir.path()).await;

    let trained = train_default(&app, dir.path()).await;
    assert!(dir.path().join("models/depth_predictor.json").exists());
    assert_eq!(trained["algorithm"]["algorithm"], "linear");
    assert_eq!(trained["metrics"]["evaluated_on"], "held_out");
    let model_id = trained["model_id"].as_str().unwrap().to_string();

    let (status, prediction) = send(
        &app,
        "POST",
        "/api/v1/predict",
        Some(json!({ "rtl_source": COUNTER, "signal": "wrap" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", prediction);
    assert_eq!(prediction["model_id"], model_id.as_str());
    assert_eq!(prediction["schema_version"], 1);
    assert!(prediction["depth"].as_f64().unwrap() >= 0.0);
    assert_eq!(prediction["interval"]["level"], 0.95);

    let (status, model) = send(&app, "GET", "/api/v1/model", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(model["model_id"], model_id.as_str());

    let (_, health) = send(&app, "GET", "/healthz", None).await;
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_results_hold_test_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = setup_test_app(dir.path()).await;

    let (status, body) = send(&app, "GET", "/api/v1/results", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "no_results");

    train_default(&app, dir.path()).await;
    let (status, results) = send(&app, "GET", "/api/v1/results", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["diagnostics"]["test_samples"], 16);
    assert_eq!(
        results["diagnostics"]["predictions"].as_array().unwrap().len(),
        16
    );
    assert!(results.get("comparison").is_none());
}

#[tokio::test]
async fn test_compare_serves_best_model() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = setup_test_app(dir.path()).await;
    std::fs::create_dir_all(dir.path().join("data")).unwrap();
    write_training_csv(&dir.path().join("data/training_data.csv"), 60);

    let request = json!({ "compare": true });
    let (status, body) = send(&app, "POST", "/api/v1/train", Some(request)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let ranking = body["comparison"].as_array().unwrap();
    assert_eq!(ranking.len(), 3);
    assert_eq!(ranking[0]["model_id"], body["model_id"]);
}

#[tokio::test]
async fn test_unknown_signal_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = setup_test_app(dir.path()).await;
    train_default(&app, dir.path()).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/predict",
        Some(json!({ "rtl_source": COUNTER, "signal": "overflow" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "signal_not_found");
}

#[tokio::test]
async fn test_malformed_rtl_is_unprocessable() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = setup_test_app(dir.path()).await;
    train_default(&app, dir.path()).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/predict",
        Some(json!({ "rtl_source": "module broken(input a;", "signal": "a" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "parse_error");
}

#[tokio::test]
async fn test_train_missing_data_keeps_previous_model() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = setup_test_app(dir.path()).await;
    let trained = train_default(&app, dir.path()).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/train",
        Some(json!({ "data_path": dir.path().join("absent.csv") })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "io_error");

    let (_, model) = send(&app, "GET", "/api/v1/model", None).await;
    assert_eq!(model["model_id"], trained["model_id"]);
}

#[tokio::test]
async fn test_training_timeout_keeps_previous_model() {
    let dir = tempfile::tempdir().unwrap();
    let trained = {
        let (app, _state) = setup_test_app(dir.path()).await;
        train_default(&app, dir.path()).await
    };
    let artifact_path = dir.path().join("models/depth_predictor.json");
    let saved = std::fs::read(&artifact_path).unwrap();

    let (app, state) = setup_test_app_with_timeout(dir.path(), Duration::ZERO).await;
    write_training_csv(&dir.path().join("data/training_data.csv"), 400);
    let (status, body) = send(&app, "POST", "/api/v1/train", Some(json!({}))).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"], "training_timeout");

    assert_eq!(std::fs::read(&artifact_path).unwrap(), saved);
    let (_, model) = send(&app, "GET", "/api/v1/model", None).await;
    assert_eq!(model["model_id"], trained["model_id"]);
    assert_eq!(state.training_timeout(), Duration::ZERO);
    let (_, health) = send(&app, "GET", "/healthz", None).await;
    assert_eq!(
        health["components"]["trainer"]["message"],
        "last training run timed out"
    );
}

#[tokio::test]
async fn test_overlapping_training_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = setup_test_app(dir.path()).await;
    std::fs::create_dir_all(dir.path().join("data")).unwrap();
    write_training_csv(&dir.path().join("data/training_data.csv"), 20);

    let running = state.try_begin_training().unwrap();
    let (status, body) = send(&app, "POST", "/api/v1/train", Some(json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "training_in_progress");
    assert!(!dir.path().join("models/depth_predictor.json").exists());

    drop(running);
    let (status, _) = send(&app, "POST", "/api/v1/train", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_hyperparameters_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = setup_test_app(dir.path()).await;
    std::fs::create_dir_all(dir.path().join("data")).unwrap();
    write_training_csv(&dir.path().join("data/training_data.csv"), 20);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/train",
        Some(json!({ "model": { "algorithm": "random_forest", "n_trees": 0 } })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_config");
}

#[tokio::test]
async fn test_existing_artifact_served_on_startup() {
    let dir = tempfile::tempdir().unwrap();
    let trained = {
        let (app, _state) = setup_test_app(dir.path()).await;
        train_default(&app, dir.path()).await
    };

    let (app, _state) = setup_test_app(dir.path()).await;
    let (status, model) = send(&app, "GET", "/api/v1/model", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(model["model_id"], trained["model_id"]);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = setup_test_app(dir.path()).await;
    train_default(&app, dir.path()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("rtl_depth_training_duration_seconds"));
    assert!(text.contains("rtl_depth_model_info"));
}
