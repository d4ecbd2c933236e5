//! Core data models shared by extraction, training and prediction

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifies one signal inside an RTL source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRef {
    /// File name or other identity of the RTL source
    pub file: String,
    /// Plain (`sum`) or hierarchical (`u_add.sum`) signal name
    pub signal: String,
}

impl SignalRef {
    pub fn new(file: impl Into<String>, signal: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            signal: signal.into(),
        }
    }
}

/// Ordered list of named features plus the version of the extractor that defined them
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub names: Vec<String>,
}

impl FeatureSchema {
    pub fn new(version: u32, names: Vec<String>) -> Self {
        Self { version, names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

impl fmt::Display for FeatureSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}[{}]", self.version, self.names.join(", "))
    }
}

/// Feature values in schema order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub schema: Arc<FeatureSchema>,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(schema: Arc<FeatureSchema>, values: Vec<f64>) -> Self {
        debug_assert_eq!(schema.len(), values.len());
        Self { schema, values }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.schema.index_of(name).map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.schema
            .names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

/// One labeled row of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub features: FeatureVector,
    /// True combinational depth
    pub depth: u32,
}

/// Two-sided interval around a predicted depth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    /// Nominal coverage, e.g. 0.95
    pub level: f64,
}

/// Output of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Predicted depth, never negative
    pub depth: f64,
    pub rounded_depth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<ConfidenceInterval>,
    pub model_id: String,
    pub schema_version: u32,
}

/// Which rows the metrics were computed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationSet {
    /// Held-out rows never used for fitting
    HeldOut,
    /// Training rows, used only when no held-out row exists
    Training,
}

/// Error statistics computed at training time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub max_error: f64,
    pub samples: usize,
    pub evaluated_on: EvaluationSet,
}
