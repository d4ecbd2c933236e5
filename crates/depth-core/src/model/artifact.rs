//! Versioned, checksummed model artifact files
//!
//! On disk an artifact is one JSON header line followed by the JSON body:
//!
//! ```text
//! {"format":"rtl-depth-model","format_version":1,"checksum":"<sha256 of body>"}
//! {"model_id":"...","algorithm":{...},"schema":{...},"params":{...},...}
//! ```
//!
//! The checksum covers the exact body bytes, so validation never depends on
//! re-serializing the parsed value.

use super::{AlgorithmConfig, ModelParams, Regressor};
use crate::error::{DepthError, Result};
use crate::models::{FeatureSchema, Metrics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub const ARTIFACT_FORMAT: &str = "rtl-depth-model";
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactHeader {
    format: String,
    format_version: u32,
    checksum: String,
}

/// A fitted model with its schema, metrics and provenance
///
/// Immutable once built; fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    model_id: String,
    algorithm: AlgorithmConfig,
    schema: Arc<FeatureSchema>,
    params: ModelParams,
    metrics: Metrics,
    trained_at: DateTime<Utc>,
    training_duration_ms: u64,
    seed: u64,
}

/// Everything about an artifact except its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub model_id: String,
    pub algorithm: AlgorithmConfig,
    pub schema: FeatureSchema,
    pub metrics: Metrics,
    pub trained_at: DateTime<Utc>,
    pub training_duration_ms: u64,
    pub seed: u64,
}

impl ModelArtifact {
    pub fn new(
        algorithm: AlgorithmConfig,
        schema: Arc<FeatureSchema>,
        params: ModelParams,
        metrics: Metrics,
        training_duration_ms: u64,
        seed: u64,
    ) -> Self {
        let model_id = compute_model_id(&params, &schema);
        Self {
            model_id,
            algorithm,
            schema,
            params,
            metrics,
            trained_at: Utc::now(),
            training_duration_ms,
            seed,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn algorithm(&self) -> &AlgorithmConfig {
        &self.algorithm
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn training_duration_ms(&self) -> u64 {
        self.training_duration_ms
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Unclamped model output for a row in schema order
    pub fn predict_raw(&self, values: &[f64]) -> f64 {
        self.params.predict_row(values)
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            model_id: self.model_id.clone(),
            algorithm: self.algorithm.clone(),
            schema: (*self.schema).clone(),
            metrics: self.metrics.clone(),
            trained_at: self.trained_at,
            training_duration_ms: self.training_duration_ms,
            seed: self.seed,
        }
    }

    /// Write atomically: temp file, fsync, rename over `path`
    ///
    /// A failure at any step leaves a previous file at `path` untouched.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let body = serde_json::to_vec(self).map_err(|e| DepthError::io(path, e.into()))?;
        let header = ArtifactHeader {
            format: ARTIFACT_FORMAT.to_string(),
            format_version: ARTIFACT_FORMAT_VERSION,
            checksum: compute_checksum(&body),
        };
        let header = serde_json::to_vec(&header).map_err(|e| DepthError::io(path, e.into()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DepthError::io(parent, e))?;
        }

        let temp_path = temp_path_for(path);
        let written = write_synced(&temp_path, &[&header, b"\n", &body])
            .and_then(|_| fs::rename(&temp_path, path).map_err(|e| DepthError::io(path, e)));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        path = %temp_path.display(),
                        error = %cleanup,
                        "Failed to remove temporary artifact file"
                    );
                }
            }
            return Err(e);
        }

        debug!(
            path = %path.display(),
            model_id = %self.model_id,
            bytes = header.len() + 1 + body.len(),
            "Model artifact written"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DepthError::MissingArtifact(path.to_path_buf()),
            _ => DepthError::io(path, e),
        })?;
        Self::from_bytes(&bytes, path)
    }

    /// Decode and validate artifact file contents; `path` is used for errors only
    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self> {
        let corrupt = |reason: String| DepthError::corrupt(path, reason);

        let split = bytes
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| corrupt("missing header line".to_string()))?;
        let (header, body) = (&bytes[..split], &bytes[split + 1..]);

        let header: ArtifactHeader = serde_json::from_slice(header)
            .map_err(|e| corrupt(format!("malformed header: {}", e)))?;
        if header.format != ARTIFACT_FORMAT {
            return Err(corrupt(format!("unexpected format tag '{}'", header.format)));
        }
        if header.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {} (expected {})",
                header.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }

        let checksum = compute_checksum(body);
        if checksum != header.checksum {
            return Err(corrupt(format!(
                "checksum mismatch: header {}, body {}",
                header.checksum, checksum
            )));
        }

        let artifact: ModelArtifact =
            serde_json::from_slice(body).map_err(|e| corrupt(format!("malformed body: {}", e)))?;
        artifact.validate().map_err(corrupt)?;
        Ok(artifact)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.params.n_features() != self.schema.len() {
            return Err(format!(
                "parameters expect {} features but schema has {}",
                self.params.n_features(),
                self.schema.len()
            ));
        }
        if self.params.family() != self.algorithm.name() {
            return Err(format!(
                "parameters are {} but algorithm is {}",
                self.params.family(),
                self.algorithm.name()
            ));
        }
        self.params.check()?;
        let expected = compute_model_id(&self.params, &self.schema);
        if expected != self.model_id {
            return Err(format!("model id {} does not match parameters", self.model_id));
        }
        Ok(())
    }
}

/// SHA-256 checksum of data as lowercase hex
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// First 16 hex chars of the SHA-256 of the parameters and schema
fn compute_model_id(params: &ModelParams, schema: &FeatureSchema) -> String {
    let bytes = serde_json::to_vec(&(params, schema)).unwrap_or_default();
    let mut id = compute_checksum(&bytes);
    id.truncate(16);
    id
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_synced(path: &Path, chunks: &[&[u8]]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| DepthError::io(path, e))?;
    for chunk in chunks {
        file.write_all(chunk).map_err(|e| DepthError::io(path, e))?;
    }
    file.sync_all().map_err(|e| DepthError::io(path, e))
}
