//! Server configuration

use anyhow::{Context, Result};
use depth_core::predictor::OutputConfig;
use depth_core::{DatasetConfig, TrainConfig};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "RTL_DEPTH_CONFIG";

/// Prefix of the environment overrides, e.g. `RTL_DEPTH_PORT`
pub const ENV_PREFIX: &str = "RTL_DEPTH";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Artifact served for predictions and replaced by training
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Training table used when a request names none
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Held-out table, used when present on disk
    #[serde(default = "default_test_data_path")]
    pub test_data_path: PathBuf,

    /// Hard limit on one training run
    #[serde(default = "default_training_timeout")]
    pub training_timeout_secs: u64,

    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub training: TrainConfig,

    /// Interval settings applied to every served prediction
    #[serde(default)]
    pub prediction: OutputConfig,
}

fn default_port() -> u16 {
    8080
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/depth_predictor.json")
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/training_data.csv")
}

fn default_test_data_path() -> PathBuf {
    PathBuf::from("data/test_data.csv")
}

fn default_training_timeout() -> u64 {
    600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            model_path: default_model_path(),
            data_path: default_data_path(),
            test_data_path: default_test_data_path(),
            training_timeout_secs: default_training_timeout(),
            dataset: DatasetConfig::default(),
            training: TrainConfig::default(),
            prediction: OutputConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from the optional config file, then environment overrides
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::from(PathBuf::from(&path)).required(true));
        }
        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read configuration sources")?;

        let config: ServerConfig = config
            .try_deserialize()
            .context("Invalid server configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.training_timeout_secs == 0 {
            anyhow::bail!("training_timeout_secs must be at least 1");
        }
        if !(self.prediction.z_score.is_finite() && self.prediction.z_score > 0.0) {
            anyhow::bail!("prediction.z_score must be a positive number");
        }
        if !(self.prediction.confidence_level > 0.0 && self.prediction.confidence_level < 1.0) {
            anyhow::bail!("prediction.confidence_level must be between 0 and 1");
        }
        self.training
            .validate()
            .context("Invalid default training configuration")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_mirror_data_layout() {
        let config = ServerConfig::default();
        assert_eq!(config.model_path, PathBuf::from("models/depth_predictor.json"));
        assert_eq!(config.data_path, PathBuf::from("data/training_data.csv"));
        assert_eq!(config.test_data_path, PathBuf::from("data/test_data.csv"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_source_with_nested_training() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(
            &path,
            r#"{"port": 9100, "training": {"model": {"algorithm": "decision_tree"}, "seed": 7}}"#,
        )
        .unwrap();

        let config: ServerConfig = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.training.seed, 7);
        assert_eq!(config.training.model.name(), "decision_tree");
        assert_eq!(config.training_timeout_secs, 600);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ServerConfig {
            training_timeout_secs: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prediction_interval_settings() {
        let config = ServerConfig {
            prediction: OutputConfig {
                z_score: 2.58,
                confidence_level: 0.99,
            },
            ..ServerConfig::default()
        };
        assert!(config.validate().is_ok());

        let config = ServerConfig {
            prediction: OutputConfig {
                z_score: -1.0,
                confidence_level: 0.95,
            },
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
