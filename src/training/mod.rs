pub mod trainer;

use serde::{Deserialize, Serialize};

/// Clustering configuration shared by persisted models and aggregate views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of clusters; severity labeling requires 3
    pub n_clusters: usize,
    /// Random seed for k-means++ seeding
    pub seed: u64,
    /// Number of k-means restarts; the lowest inertia wins
    pub n_init: usize,
    /// Maximum Lloyd iterations per restart
    pub max_iter: usize,
    /// Convergence threshold, relative to the mean feature variance
    pub tolerance: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_clusters: 3,
            seed: 42,
            n_init: 10,
            max_iter: 300,
            tolerance: 1e-4,
        }
    }
}

impl TrainingConfig {
    /// Same configuration with a different cluster count
    pub fn with_n_clusters(mut self, n_clusters: usize) -> Self {
        self.n_clusters = n_clusters;
        self
    }
}

/// Outcome of a batch training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainAllReport {
    /// Cancer types with a model available afterwards
    pub trained: Vec<String>,
    /// Cancer types skipped, with the reason
    pub skipped: Vec<SkippedType>,
    /// Wall-clock duration in seconds
    pub duration_secs: f64,
}

/// A cancer type that could not be trained
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedType {
    pub cancer_type: String,
    pub reason: String,
}
