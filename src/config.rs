use crate::error::Result;
use crate::training::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Engine configuration; every field has a default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Source patient table
    pub data_path: PathBuf,
    /// Root directory for persisted per-type artifacts
    pub models_dir: PathBuf,
    /// Train every available cancer type at startup
    pub auto_train: bool,
    /// Load every persisted model at startup instead of on first use
    pub preload_models: bool,
    /// Clustering parameters
    pub training: TrainingConfig,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/raw/Breast Cancer METABRIC.csv"),
            models_dir: PathBuf::from("saved_models/aggressivity"),
            auto_train: false,
            preload_models: false,
            training: TrainingConfig::default(),
        }
    }
}

impl StrataConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
