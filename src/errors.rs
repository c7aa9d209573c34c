use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Custom error types for WingShapeR
#[derive(Error, Debug)]
pub enum WingShapeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    /// A row or file lacks data the analysis cannot do without
    #[error("Data format error in specimen '{specimen}': {detail}")]
    DataFormat {
        specimen: String,
        detail: String,
    },

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Discriminant analysis by {factor} needs at least 2 groups, found {found}")]
    InsufficientGroups {
        factor: String,
        found: usize,
    },

    #[error("Dataset contains no specimens")]
    EmptyDataset,

    #[error("Numeric error: {0}")]
    Numeric(String),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),
}

impl WingShapeError {
    pub fn data_format(specimen: impl Into<String>, detail: impl Into<String>) -> Self {
        WingShapeError::DataFormat {
            specimen: specimen.into(),
            detail: detail.into(),
        }
    }
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, WingShapeError>;
