//! Error taxonomy for extraction, training, persistence and prediction
//!
//! Every failure carries enough context (signal name, schemas, paths) for a
//! caller to render a precise message. The core never formats user-facing
//! text beyond these `Display` implementations.

use crate::models::FeatureSchema;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DepthError>;

#[derive(Debug, Error)]
pub enum DepthError {
    /// RTL source is malformed or uses an unsupported construct
    #[error("parse error at {line}:{column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    /// Signal name does not resolve to any declared signal
    #[error("signal '{signal}' not found (searched from module '{module}')")]
    SignalNotFound { signal: String, module: String },

    /// Signal name resolves to more than one declared signal
    #[error("signal '{signal}' is ambiguous, candidates: {}", candidates.join(", "))]
    AmbiguousSignal {
        signal: String,
        candidates: Vec<String>,
    },

    /// Feature schema of an input does not match the expected one
    #[error("feature schema mismatch: expected {expected}, got {actual}")]
    SchemaMismatch {
        expected: FeatureSchema,
        actual: FeatureSchema,
    },

    #[error("dataset '{0}' contains no examples")]
    EmptyDataset(String),

    #[error("corrupt model artifact {}: {reason}", path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("model artifact not found: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("invalid dataset '{source_name}' at line {line}: {message}")]
    InvalidDataset {
        source_name: String,
        line: usize,
        message: String,
    },

    #[error("invalid training configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DepthError {
    pub(crate) fn parse(line: usize, column: usize, message: impl Into<String>) -> Self {
        DepthError::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DepthError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DepthError::CorruptArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable identifier of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            DepthError::Parse { .. } => "parse_error",
            DepthError::SignalNotFound { .. } => "signal_not_found",
            DepthError::AmbiguousSignal { .. } => "ambiguous_signal",
            DepthError::SchemaMismatch { .. } => "schema_mismatch",
            DepthError::EmptyDataset(_) => "empty_dataset",
            DepthError::CorruptArtifact { .. } => "corrupt_artifact",
            DepthError::MissingArtifact(_) => "missing_artifact",
            DepthError::InvalidDataset { .. } => "invalid_dataset",
            DepthError::InvalidConfig(_) => "invalid_config",
            DepthError::Io { .. } => "io_error",
        }
    }

    /// True for errors caused by the caller's input rather than the environment
    pub fn is_input_error(&self) -> bool {
        !matches!(self, DepthError::Io { .. } | DepthError::CorruptArtifact { .. })
    }
}
