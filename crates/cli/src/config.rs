//! Configuration management for the CLI
//!
//! Values come from, in order: command line flags and their environment
//! variables, the user config file, built-in defaults.

use crate::output::OutputFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_MODEL_PATH: &str = "models/depth_predictor.json";
const DEFAULT_DATA_PATH: &str = "data/training_data.csv";
const DEFAULT_TEST_DATA_PATH: &str = "data/test_data.csv";

/// User config file contents
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub model_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
    pub test_data_path: Option<PathBuf>,
    pub default_format: Option<OutputFormat>,
}

impl Config {
    /// Load the user config, empty when the file does not exist
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!(path = %path.display(), "Loaded user config");
        Ok(config)
    }

    /// `~/.config/rtl-depth/config.json`
    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("rtl-depth").join("config.json"))
    }
}

/// Effective settings for one invocation
#[derive(Debug, Clone)]
pub struct Settings {
    pub model_path: PathBuf,
    pub format: OutputFormat,
    config: Config,
}

impl Settings {
    pub fn resolve(model_path: Option<PathBuf>, format: Option<OutputFormat>) -> Result<Self> {
        Ok(Self::with_config(Config::load()?, model_path, format))
    }

    pub fn with_config(
        config: Config,
        model_path: Option<PathBuf>,
        format: Option<OutputFormat>,
    ) -> Self {
        let model_path = model_path
            .or_else(|| config.model_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));
        let format = format.or(config.default_format).unwrap_or_default();
        Self {
            model_path,
            format,
            config,
        }
    }

    pub fn data_path(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.config.data_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH))
    }

    /// Test table to use; the default one only when it exists
    pub fn test_data_path(&self, flag: Option<PathBuf>) -> Option<PathBuf> {
        if flag.is_some() {
            return flag;
        }
        let path = self
            .config
            .test_data_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEST_DATA_PATH));
        path.exists().then_some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config_file() {
        let config = Config {
            model_path: Some(PathBuf::from("from_file.json")),
            default_format: Some(OutputFormat::Json),
            ..Config::default()
        };
        let flag = Some(PathBuf::from("flag.json"));
        let settings = Settings::with_config(config.clone(), flag, None);
        assert_eq!(settings.model_path, PathBuf::from("flag.json"));
        assert!(matches!(settings.format, OutputFormat::Json));

        let settings = Settings::with_config(config, None, Some(OutputFormat::Table));
        assert_eq!(settings.model_path, PathBuf::from("from_file.json"));
        assert!(matches!(settings.format, OutputFormat::Table));
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::with_config(Config::default(), None, None);
        assert_eq!(settings.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
        assert_eq!(settings.data_path(None), PathBuf::from(DEFAULT_DATA_PATH));
    }

    #[test]
    fn test_missing_default_test_table_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            test_data_path: Some(dir.path().join("absent.csv")),
            ..Config::default()
        };
        let settings = Settings::with_config(config, None, None);
        assert_eq!(settings.test_data_path(None), None);
        assert_eq!(
            settings.test_data_path(Some(PathBuf::from("explicit.csv"))),
            Some(PathBuf::from("explicit.csv"))
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"model_path": "m.json", "default_format": "json"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.model_path, Some(PathBuf::from("m.json")));
        assert!(matches!(config.default_format, Some(OutputFormat::Json)));
        assert!(Config::load_from(&dir.path().join("none.json")).unwrap().model_path.is_none());
    }
}
