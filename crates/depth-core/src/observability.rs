//! Observability infrastructure for training and prediction
//!
//! Provides:
//! - Prometheus metrics (training duration, prediction latency, error counts, loaded model)
//! - Structured logging of significant events with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for prediction latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Histogram buckets for training runs (in seconds)
const TRAINING_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<DepthMetricsInner> = OnceLock::new();

struct DepthMetricsInner {
    training_duration_seconds: Histogram,
    prediction_latency_seconds: Histogram,
    trainings_total: IntCounter,
    predictions_total: IntCounter,
    errors_total: IntCounterVec,
    model_info: GaugeVec,
}

impl DepthMetricsInner {
    fn new() -> Self {
        Self {
            training_duration_seconds: register_histogram!(
                "rtl_depth_training_duration_seconds",
                "Wall time of model training runs",
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            prediction_latency_seconds: register_histogram!(
                "rtl_depth_prediction_latency_seconds",
                "Time spent extracting features and predicting one signal",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            trainings_total: register_int_counter!(
                "rtl_depth_trainings_total",
                "Total number of completed training runs"
            )
            .expect("Failed to register trainings_total"),

            predictions_total: register_int_counter!(
                "rtl_depth_predictions_total",
                "Total number of depth predictions returned"
            )
            .expect("Failed to register predictions_total"),

            errors_total: register_int_counter_vec!(
                "rtl_depth_errors_total",
                "Failed operations by error kind",
                &["kind"]
            )
            .expect("Failed to register errors_total"),

            model_info: register_gauge_vec!(
                "rtl_depth_model_info",
                "Information about the currently served model",
                &["model_id", "algorithm", "schema_version"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Handle to the process-wide Prometheus metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct DepthMetrics {
    _private: (),
}

impl Default for DepthMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthMetrics {
    /// Create a handle, registering the metrics on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DepthMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DepthMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_training_duration(&self, duration_secs: f64) {
        self.inner().training_duration_seconds.observe(duration_secs);
        self.inner().trainings_total.inc();
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions(&self) {
        self.inner().predictions_total.inc();
    }

    /// Count a failure under its stable error kind
    pub fn inc_errors(&self, kind: &str) {
        self.inner().errors_total.with_label_values(&[kind]).inc();
    }

    /// Replace the served-model info series
    pub fn set_model_info(&self, model_id: &str, algorithm: &str, schema_version: u32) {
        let schema_version = schema_version.to_string();
        self.clear_model_info();
        self.inner()
            .model_info
            .with_label_values(&[model_id, algorithm, &schema_version])
            .set(1.0);
    }

    pub fn clear_model_info(&self) {
        self.inner().model_info.reset();
    }
}

/// Structured logger for training and prediction events
#[derive(Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    pub fn log_training_completed(
        &self,
        model_id: &str,
        algorithm: &str,
        train_samples: usize,
        test_samples: usize,
        mae: f64,
        rmse: f64,
        r2: f64,
        duration_ms: u64,
    ) {
        info!(
            event = "training_completed",
            component = %self.component,
            model_id = %model_id,
            algorithm = %algorithm,
            train_samples = train_samples,
            test_samples = test_samples,
            mae = mae,
            rmse = rmse,
            r2 = r2,
            duration_ms = duration_ms,
            "Model training completed"
        );
    }

    pub fn log_prediction(&self, signal: &str, depth: f64, rounded_depth: u32, model_id: &str) {
        info!(
            event = "prediction_generated",
            component = %self.component,
            signal = %signal,
            depth = depth,
            rounded_depth = rounded_depth,
            model_id = %model_id,
            "Generated depth prediction"
        );
    }

    pub fn log_artifact_saved(&self, path: &str, model_id: &str) {
        info!(
            event = "artifact_saved",
            component = %self.component,
            path = %path,
            model_id = %model_id,
            "Model artifact saved"
        );
    }

    /// Log a failed operation with its error kind
    pub fn log_failure(&self, operation: &str, kind: &str, message: &str) {
        warn!(
            event = "operation_failed",
            component = %self.component,
            operation = %operation,
            kind = %kind,
            error = %message,
            "Operation failed"
        );
    }
}
