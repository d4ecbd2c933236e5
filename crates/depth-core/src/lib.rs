//! Core library for RTL combinational depth prediction
//!
//! This crate provides:
//! - A Verilog/SystemVerilog subset front end and netlist elaboration
//! - Deterministic logic-cone feature extraction for signals
//! - Regression models with versioned, checksummed artifacts
//! - Training with held-out evaluation and model comparison
//! - Schema-checked, thread-safe prediction
//! - Health checks and observability

pub mod dataset;
pub mod error;
pub mod features;
pub mod health;
pub mod model;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod rtl;
pub mod trainer;

pub use dataset::{Dataset, DatasetConfig};
pub use error::{DepthError, Result};
pub use features::{feature_schema, FeatureExtractor, FEATURE_NAMES, FEATURE_SCHEMA_VERSION};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use model::{AlgorithmConfig, ModelArtifact, ModelSummary};
pub use models::*;
pub use observability::{DepthMetrics, StructuredLogger};
pub use predictor::{DepthPredictor, Predictor};
pub use trainer::{
    ComparisonEntry, ComparisonReport, PredictionPair, TrainConfig, Trainer, TrainingDiagnostics,
    TrainingOutcome,
};
