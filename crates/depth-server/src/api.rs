//! HTTP API: training, prediction, results, health and Prometheus metrics

use crate::state::{AppState, TrainingResults};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use depth_core::health::{components, ComponentStatus};
use depth_core::model::AlgorithmConfig;
use depth_core::trainer::{ComparisonEntry, TrainingOutcome};
use depth_core::{
    Dataset, DepthError, Metrics, PredictionResult, TrainConfig, Trainer,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Error body `{error: kind, message}` with a matching status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    fn no_model() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "no_model",
            "no model is loaded, train one first",
        )
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<DepthError> for ApiError {
    fn from(err: DepthError) -> Self {
        let status = match &err {
            DepthError::SignalNotFound { .. } | DepthError::MissingArtifact(_) => {
                StatusCode::NOT_FOUND
            }
            DepthError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                StatusCode::NOT_FOUND
            }
            err if err.is_input_error() => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.kind, "message": self.message })),
        )
            .into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TrainRequest {
    pub data_path: Option<PathBuf>,
    pub test_data_path: Option<PathBuf>,
    pub model: Option<AlgorithmConfig>,
    pub seed: Option<u64>,
    pub test_fraction: Option<f64>,
    /// Train every family and serve the best one
    pub compare: bool,
}

#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub model_id: String,
    pub algorithm: AlgorithmConfig,
    pub metrics: Metrics,
    pub artifact_path: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Vec<ComparisonEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub rtl_source: String,
    pub signal: String,
}

/// Inputs of one training run, resolved against the server defaults
struct TrainingJob {
    config: TrainConfig,
    dataset_config: depth_core::DatasetConfig,
    data_path: PathBuf,
    /// Explicit test tables must exist, the default one is optional
    test_data_path: Option<(PathBuf, bool)>,
    compare: bool,
}

struct TrainingRun {
    outcome: TrainingOutcome,
    comparison: Option<Vec<ComparisonEntry>>,
}

impl TrainingJob {
    fn from_request(state: &AppState, request: TrainRequest) -> Self {
        let defaults = &state.config;
        let mut config = defaults.training.clone();
        if let Some(model) = request.model {
            config.model = model;
        }
        if let Some(seed) = request.seed {
            config.seed = seed;
        }
        if let Some(test_fraction) = request.test_fraction {
            config.test_fraction = test_fraction;
        }
        let test_data_path = match request.test_data_path {
            Some(path) => Some((path, true)),
            None if request.data_path.is_none() => Some((defaults.test_data_path.clone(), false)),
            None => None,
        };
        Self {
            config,
            dataset_config: defaults.dataset.clone(),
            data_path: request.data_path.unwrap_or_else(|| defaults.data_path.clone()),
            test_data_path,
            compare: request.compare,
        }
    }

    /// CPU-bound part of training, run on a blocking worker
    fn run(self) -> depth_core::Result<TrainingRun> {
        let trainer = Trainer::new(self.config)?;
        let dataset = Dataset::from_csv(&self.data_path, &self.dataset_config)?;
        let test = match &self.test_data_path {
            Some((path, true)) => Some(Dataset::from_csv(path, &self.dataset_config)?),
            Some((path, false)) if path.exists() => {
                Some(Dataset::from_csv(path, &self.dataset_config)?)
            }
            _ => None,
        };

        if self.compare {
            let candidates = AlgorithmConfig::all_defaults();
            let report = trainer.compare(&dataset, test.as_ref(), &candidates)?;
            Ok(TrainingRun {
                outcome: report.best,
                comparison: Some(report.ranking),
            })
        } else {
            Ok(TrainingRun {
                outcome: trainer.train(&dataset, test.as_ref())?,
                comparison: None,
            })
        }
    }
}

/// Train, persist atomically, then serve the new model
///
/// A run that exceeds the timeout is abandoned before anything is written,
/// so the artifact on disk and the served model stay as they were.
async fn train(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrainRequest>,
) -> Result<Json<TrainResponse>, ApiError> {
    let Some(_guard) = state.try_begin_training() else {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "training_in_progress",
            "a training run is already in progress",
        ));
    };

    let job = TrainingJob::from_request(&state, request);
    let timeout = state.training_timeout();
    info!(
        data_path = %job.data_path.display(),
        algorithm = %job.config.model.name(),
        compare = job.compare,
        "Training requested"
    );

    let started = Instant::now();
    let worker = tokio::task::spawn_blocking(move || job.run());
    let run = match tokio::time::timeout(timeout, worker).await {
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs_f64(), "Training run timed out");
            state.metrics.inc_errors("training_timeout");
            state
                .health_registry
                .set_degraded(components::TRAINER, "last training run timed out")
                .await;
            return Err(ApiError::new(
                StatusCode::GATEWAY_TIMEOUT,
                "training_timeout",
                format!("training exceeded {:.1} seconds", timeout.as_secs_f64()),
            ));
        }
        Ok(Err(join_error)) => {
            state
                .health_registry
                .set_degraded(components::TRAINER, "training worker failed")
                .await;
            return Err(ApiError::internal(format!("training worker failed: {}", join_error)));
        }
        Ok(Ok(Err(e))) => {
            warn!(error = %e, kind = e.kind(), "Training request failed");
            return Err(e.into());
        }
        Ok(Ok(Ok(run))) => run,
    };

    let artifact = Arc::new(run.outcome.artifact);
    let model_path = state.config.model_path.clone();
    save_artifact(&state, Arc::clone(&artifact), model_path.clone()).await?;

    state
        .install(Arc::new(state.predictor_for(Arc::clone(&artifact))))
        .await;
    state.health_registry.set_healthy(components::TRAINER).await;

    let artifact_path = model_path.display().to_string();
    state.logger.log_artifact_saved(&artifact_path, artifact.model_id());
    state
        .set_results(TrainingResults {
            model: artifact.summary(),
            metrics: run.outcome.metrics.clone(),
            diagnostics: run.outcome.diagnostics.clone(),
            comparison: run.comparison.clone(),
            artifact_path: artifact_path.clone(),
            completed_at: chrono::Utc::now(),
        })
        .await;

    Ok(Json(TrainResponse {
        model_id: artifact.model_id().to_string(),
        algorithm: artifact.algorithm().clone(),
        metrics: run.outcome.metrics,
        artifact_path,
        duration_ms: started.elapsed().as_millis() as u64,
        comparison: run.comparison,
    }))
}

async fn save_artifact(
    state: &AppState,
    artifact: Arc<depth_core::ModelArtifact>,
    path: PathBuf,
) -> Result<(), ApiError> {
    let saved = tokio::task::spawn_blocking(move || artifact.save(Path::new(&path)))
        .await
        .map_err(|e| ApiError::internal(format!("artifact writer failed: {}", e)))?;
    if let Err(e) = saved {
        state.metrics.inc_errors(e.kind());
        state.logger.log_failure("save_artifact", e.kind(), &e.to_string());
        return Err(e.into());
    }
    Ok(())
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictionResult>, ApiError> {
    let predictor = state.predictor().await.ok_or_else(ApiError::no_model)?;
    let result = tokio::task::spawn_blocking(move || {
        predictor.predict_signal(&request.rtl_source, &request.signal)
    })
    .await
    .map_err(|e| ApiError::internal(format!("prediction worker failed: {}", e)))??;
    Ok(Json(result))
}

async fn model(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let predictor = state.predictor().await.ok_or_else(ApiError::no_model)?;
    Ok(Json(predictor.artifact().summary()))
}

async fn results(State(state): State<Arc<AppState>>) -> Result<Json<TrainingResults>, ApiError> {
    state.results().await.map(Json).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "no_results",
            "no training run has completed since startup",
        )
    })
}

/// 200 while operational, 503 once a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;
    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| ApiError::internal(format!("failed to encode metrics: {}", e)))?;
    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/train", post(train))
        .route("/api/v1/predict", post(predict))
        .route("/api/v1/model", get(model))
        .route("/api/v1/results", get(results))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
