//! # Strata: aggressivity stratification for breast cancer cohorts
//!
//! Strata clusters patients of each cancer type on five severity covariates
//! (tumor size, histologic grade, positive lymph nodes, mutation count and
//! Nottingham prognostic index) and names the clusters low, medium and high
//! by their mean prognostic index.
//!
//! ## Features
//!
//! - Per-cancer-type scaler + k-means models, trained on demand or in batch
//! - Persisted artifacts with atomic replacement
//! - Single-patient prediction with a distance-based confidence score
//! - Population-wide views recomputed from scratch on every call
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata::data::DataLoader;
//! use strata::model::artifact::ArtifactStore;
//! use strata::predict::{predict_severity, FeatureInput};
//! use strata::store::ModelStore;
//! use strata::training::TrainingConfig;
//!
//! let cohort = Arc::new(DataLoader::new().load("metabric.csv").unwrap());
//! let artifacts = ArtifactStore::new("saved_models/aggressivity").unwrap();
//! let store = ModelStore::new(cohort, artifacts, TrainingConfig::default());
//!
//! let mut features = FeatureInput::default();
//! features.insert("Tumor Size", 22.0);
//! features.insert("Neoplasm Histologic Grade", 3.0);
//! features.insert("Lymph nodes examined positive", 4.0);
//! features.insert("Mutation Count", 6.0);
//! features.insert("Nottingham prognostic index", 5.2);
//!
//! let prediction = predict_severity(&store, &features, "Breast Invasive Ductal Carcinoma").unwrap();
//! println!("{} ({:.2})", prediction.severity_level, prediction.confidence);
//! ```

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod predict;
pub mod store;
pub mod training;
pub mod utils;

/// Re-export commonly used types
pub use aggregate::{AggregateViews, LevelStats, SeverityRow, TypeLevelCount};
pub use config::StrataConfig;
pub use data::loader::DataLoader;
pub use data::{Cohort, PatientRecord};
pub use error::{Result, StrataError};
pub use model::{SeverityLevel, SeverityModel};
pub use predict::{FeatureInput, SeverityPrediction};
pub use store::ModelStore;
pub use training::{TrainAllReport, TrainingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!(
        "{} v{} - aggressivity stratification with per-cancer-type k-means",
        NAME, VERSION
    )
}
