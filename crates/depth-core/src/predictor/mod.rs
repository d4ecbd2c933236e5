//! Depth prediction from a loaded model artifact

mod output;

pub use output::{OutputConfig, OutputFormatter, DEFAULT_CONFIDENCE_LEVEL, DEFAULT_Z_SCORE};

use crate::error::{DepthError, Result};
use crate::features::FeatureExtractor;
use crate::model::ModelArtifact;
use crate::models::{FeatureSchema, FeatureVector, PredictionResult};
use crate::observability::{DepthMetrics, StructuredLogger};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Trait for prediction implementations
///
/// Implementations take `&self` only and may be shared across threads.
pub trait Predictor: Send + Sync {
    /// Predict the depth for a feature vector in the model's schema
    fn predict(&self, features: &FeatureVector) -> Result<PredictionResult>;

    /// Identifier of the artifact behind the predictions
    fn model_id(&self) -> &str;

    /// Schema every input must carry
    fn schema(&self) -> &FeatureSchema;
}

/// Predictor backed by an immutable [`ModelArtifact`]
pub struct DepthPredictor {
    artifact: Arc<ModelArtifact>,
    extractor: FeatureExtractor,
    formatter: OutputFormatter,
    metrics: DepthMetrics,
    logger: StructuredLogger,
}

impl DepthPredictor {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let artifact = ModelArtifact::load(path.as_ref())?;
        debug!(
            path = %path.as_ref().display(),
            model_id = %artifact.model_id(),
            algorithm = %artifact.algorithm().name(),
            "Loaded model artifact"
        );
        Ok(Self::from_artifact(Arc::new(artifact)))
    }

    pub fn from_artifact(artifact: Arc<ModelArtifact>) -> Self {
        Self {
            artifact,
            extractor: FeatureExtractor::new(),
            formatter: OutputFormatter::new(),
            metrics: DepthMetrics::new(),
            logger: StructuredLogger::new("predictor"),
        }
    }

    pub fn with_formatter(mut self, formatter: OutputFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn artifact(&self) -> &Arc<ModelArtifact> {
        &self.artifact
    }

    /// Extract features for `signal` in `rtl_source` and predict its depth
    pub fn predict_signal(&self, rtl_source: &str, signal: &str) -> Result<PredictionResult> {
        let started = Instant::now();
        let result = self
            .extractor
            .extract(rtl_source, signal)
            .and_then(|features| self.predict(&features));

        match result {
            Ok(prediction) => {
                self.metrics
                    .observe_prediction_latency(started.elapsed().as_secs_f64());
                self.metrics.inc_predictions();
                self.logger.log_prediction(
                    signal,
                    prediction.depth,
                    prediction.rounded_depth,
                    &prediction.model_id,
                );
                Ok(prediction)
            }
            Err(e) => {
                // Schema errors were already counted by predict
                if !matches!(e, DepthError::SchemaMismatch { .. }) {
                    self.metrics.inc_errors(e.kind());
                }
                self.logger.log_failure("predict", e.kind(), &e.to_string());
                Err(e)
            }
        }
    }
}

impl Predictor for DepthPredictor {
    fn predict(&self, features: &FeatureVector) -> Result<PredictionResult> {
        let schema = self.artifact.schema();
        if *features.schema != **schema || features.values.len() != schema.len() {
            self.metrics.inc_errors("schema_mismatch");
            return Err(DepthError::SchemaMismatch {
                expected: (**schema).clone(),
                actual: (*features.schema).clone(),
            });
        }

        let raw = self.artifact.predict_raw(&features.values);
        Ok(self.formatter.format(
            raw,
            self.artifact.metrics().rmse,
            self.artifact.model_id(),
            schema.version,
        ))
    }

    fn model_id(&self) -> &str {
        self.artifact.model_id()
    }

    fn schema(&self) -> &FeatureSchema {
        self.artifact.schema()
    }
}
