//! Post-processing of raw model outputs into prediction results

use crate::models::{ConfidenceInterval, PredictionResult};
use serde::{Deserialize, Serialize};

/// Two-sided normal quantile for 95% coverage
pub const DEFAULT_Z_SCORE: f64 = 1.96;

pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Half-width of the interval in units of the model's RMSE
    pub z_score: f64,
    /// Coverage reported alongside the interval
    pub confidence_level: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            z_score: DEFAULT_Z_SCORE,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
        }
    }
}

/// Clamps raw outputs to valid depths and attaches an error interval
#[derive(Debug, Clone, Default)]
pub struct OutputFormatter {
    config: OutputConfig,
}

impl OutputFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Build a result from a raw model output and the model's test RMSE
    pub fn format(
        &self,
        raw: f64,
        rmse: f64,
        model_id: &str,
        schema_version: u32,
    ) -> PredictionResult {
        let depth = clamp_depth(raw);
        PredictionResult {
            depth,
            rounded_depth: round_half_up(depth),
            interval: self.interval(depth, rmse),
            model_id: model_id.to_string(),
            schema_version,
        }
    }

    fn interval(&self, depth: f64, rmse: f64) -> Option<ConfidenceInterval> {
        if !rmse.is_finite() || rmse < 0.0 {
            return None;
        }
        let half_width = self.config.z_score * rmse;
        Some(ConfidenceInterval {
            lower: (depth - half_width).max(0.0),
            upper: depth + half_width,
            level: self.config.confidence_level,
        })
    }
}

/// Depths are never negative; non-finite outputs collapse to zero
fn clamp_depth(raw: f64) -> f64 {
    if raw.is_finite() {
        raw.max(0.0)
    } else {
        0.0
    }
}

fn round_half_up(depth: f64) -> u32 {
    (depth + 0.5).floor().min(u32::MAX as f64) as u32
}
