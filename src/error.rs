use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the stratification engine
#[derive(Debug, Error)]
pub enum StrataError {
    /// Source table does not exist
    #[error("Patient data not found at: {0:?}")]
    DataNotFound(PathBuf),

    /// One or more required columns are absent from the source table
    #[error("Missing required columns in patient data: {missing:?}")]
    SchemaInvalid { missing: Vec<String> },

    /// Not enough covariate-complete rows to fit the requested clusters
    #[error(
        "Not enough samples to cluster for cancer type '{cancer_type}' \
         (found {found} rows, need {required})"
    )]
    InsufficientData {
        cancer_type: String,
        found: usize,
        required: usize,
    },

    /// No persisted artifacts for the cancer type
    #[error("No saved artifacts for cancer type '{cancer_type}' in {dir:?}")]
    ArtifactNotFound { cancer_type: String, dir: PathBuf },

    /// The artifact directory for a cancer type holds another type's model
    #[error("Artifact directory {dir:?} for '{cancer_type}' already holds a model for '{owner}'")]
    ArtifactConflict {
        cancer_type: String,
        owner: String,
        dir: PathBuf,
    },

    /// Prediction input lacks a required covariate
    #[error("Missing required feature for prediction: {0}")]
    MissingFeature(String),

    /// Prediction input carries a covariate that is not a finite number
    #[error("Invalid value for feature '{name}': {value}")]
    InvalidFeature { name: String, value: String },

    /// Severity labeling only defines three ordered levels
    #[error("Unsupported cluster count {0}: severity labeling requires exactly 3 clusters")]
    UnsupportedClusterCount(usize),

    /// Clustering backend failure
    #[error("Clustering error: {0}")]
    Clustering(#[from] linfa_clustering::KMeansError),

    /// Unparseable row or file format
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StrataError {
    /// True for failures caused by a partition too small to cluster
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, StrataError::InsufficientData { .. })
    }

    /// True when a load found nothing persisted
    pub fn is_artifact_not_found(&self) -> bool {
        matches!(self, StrataError::ArtifactNotFound { .. })
    }
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, StrataError>;
