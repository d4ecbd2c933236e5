//! HTTP service for training and serving RTL depth models
//!
//! Exposes the training, prediction and results workflow of the depth
//! predictor over JSON, plus health checks and Prometheus metrics.

pub mod api;
pub mod config;
pub mod state;

pub use api::create_router;
pub use config::ServerConfig;
pub use state::{AppState, TrainingResults};
