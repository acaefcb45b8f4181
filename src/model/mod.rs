pub mod artifact;
pub mod kmeans;

use crate::data::preprocessing::StandardScaler;
use kmeans::KMeans;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordinal aggressivity level assigned to a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
    /// Only produced by prediction when a cluster has no label
    Unknown,
}

impl SeverityLevel {
    /// Labels assigned to clusters, by ascending mean prognostic index
    pub const ORDERED: [SeverityLevel; 3] =
        [SeverityLevel::Low, SeverityLevel::Medium, SeverityLevel::High];

    /// Get level as string
    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityLevel::Low => "low",
            SeverityLevel::Medium => "medium",
            SeverityLevel::High => "high",
            SeverityLevel::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cluster index to severity level
pub type LabelMap = BTreeMap<usize, SeverityLevel>;

/// Fitted scaler, clusterer and label map for one cancer type
#[derive(Debug, Clone, PartialEq)]
pub struct SeverityModel {
    pub cancer_type: String,
    pub scaler: StandardScaler,
    pub kmeans: KMeans,
    pub label_map: LabelMap,
}

impl SeverityModel {
    /// Level for a cluster index, `Unknown` if unmapped
    pub fn level_of(&self, cluster: usize) -> SeverityLevel {
        self.label_map
            .get(&cluster)
            .copied()
            .unwrap_or(SeverityLevel::Unknown)
    }
}
