//! Shared service state: the served model and the last training results

use crate::config::ServerConfig;
use chrono::{DateTime, Utc};
use depth_core::health::components;
use depth_core::predictor::OutputFormatter;
use depth_core::trainer::ComparisonEntry;
use depth_core::{
    DepthError, DepthMetrics, DepthPredictor, HealthRegistry, Metrics, ModelArtifact,
    ModelSummary, StructuredLogger, TrainingDiagnostics,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{info, warn};

/// Outcome of the most recent successful training request
#[derive(Debug, Clone, Serialize)]
pub struct TrainingResults {
    pub model: ModelSummary,
    pub metrics: Metrics,
    pub diagnostics: TrainingDiagnostics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Vec<ComparisonEntry>>,
    pub artifact_path: String,
    pub completed_at: DateTime<Utc>,
}

pub struct AppState {
    pub config: ServerConfig,
    pub health_registry: HealthRegistry,
    pub metrics: DepthMetrics,
    pub logger: StructuredLogger,
    predictor: RwLock<Option<Arc<DepthPredictor>>>,
    results: RwLock<Option<TrainingResults>>,
    /// Held for the whole of a training run so runs never overlap
    training: Mutex<()>,
    training_timeout: Duration,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        health_registry: HealthRegistry,
        metrics: DepthMetrics,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            logger: StructuredLogger::new("depth-server"),
            predictor: RwLock::new(None),
            results: RwLock::new(None),
            training_timeout: Duration::from_secs(config.training_timeout_secs),
            training: Mutex::new(()),
            config,
        }
    }

    pub fn with_training_timeout(mut self, timeout: Duration) -> Self {
        self.training_timeout = timeout;
        self
    }

    pub fn training_timeout(&self) -> Duration {
        self.training_timeout
    }

    /// Claim the training slot, `None` while another run holds it
    pub fn try_begin_training(&self) -> Option<MutexGuard<'_, ()>> {
        self.training.try_lock().ok()
    }

    /// Serve the artifact at the configured model path if one loads
    ///
    /// A missing or unreadable artifact leaves the service up without a
    /// model so a training request can produce one.
    pub async fn load_initial_model(&self) {
        let path = self.config.model_path.clone();
        let loaded = tokio::task::spawn_blocking(move || DepthPredictor::load(path)).await;

        match loaded {
            Ok(Ok(predictor)) => {
                let predictor = predictor.with_formatter(self.formatter());
                self.install(Arc::new(predictor)).await
            }
            Ok(Err(DepthError::MissingArtifact(path))) => {
                info!(
                    path = %path.display(),
                    "No model artifact yet, train one to serve predictions"
                );
                self.health_registry
                    .set_degraded(components::MODEL, "no model loaded")
                    .await;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to load model artifact");
                self.metrics.inc_errors(e.kind());
                self.health_registry
                    .set_degraded(components::MODEL, format!("model not loaded: {}", e))
                    .await;
            }
            Err(e) => {
                warn!(error = %e, "Model loading task failed");
                self.health_registry
                    .set_degraded(components::MODEL, "model loading task failed")
                    .await;
            }
        }
    }

    /// Predictor for `artifact` using the configured interval settings
    pub fn predictor_for(&self, artifact: Arc<ModelArtifact>) -> DepthPredictor {
        DepthPredictor::from_artifact(artifact).with_formatter(self.formatter())
    }

    fn formatter(&self) -> OutputFormatter {
        OutputFormatter::with_config(self.config.prediction.clone())
    }

    /// Swap in a new predictor; requests already holding the old one finish with it
    pub async fn install(&self, predictor: Arc<DepthPredictor>) {
        let artifact = predictor.artifact();
        self.metrics.set_model_info(
            artifact.model_id(),
            artifact.algorithm().name(),
            artifact.schema().version,
        );
        info!(
            model_id = %artifact.model_id(),
            algorithm = %artifact.algorithm().name(),
            "Serving model"
        );
        *self.predictor.write().await = Some(predictor);
        self.health_registry.set_healthy(components::MODEL).await;
    }

    pub async fn predictor(&self) -> Option<Arc<DepthPredictor>> {
        self.predictor.read().await.clone()
    }

    pub async fn set_results(&self, results: TrainingResults) {
        *self.results.write().await = Some(results);
    }

    pub async fn results(&self) -> Option<TrainingResults> {
        self.results.read().await.clone()
    }
}
