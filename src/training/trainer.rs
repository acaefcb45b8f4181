use crate::data::preprocessing::{CovariateMatrix, StandardScaler};
use crate::data::{Cohort, NPI_INDEX, NUM_FEATURES};
use crate::error::{Result, StrataError};
use crate::model::kmeans::{distinct_rows, KMeans};
use crate::model::{LabelMap, SeverityLevel, SeverityModel};
use crate::training::TrainingConfig;
use std::cmp::Ordering;
use tracing::{debug, info};

/// A fitted partition: the model plus each training row's cluster
#[derive(Debug, Clone)]
pub struct TrainedPartition {
    pub model: SeverityModel,
    /// Covariate-complete rows the model was fitted on
    pub matrix: CovariateMatrix,
    /// Cluster index of each row in `matrix`
    pub clusters: Vec<usize>,
}

impl TrainedPartition {
    /// Severity level of each row in `matrix`
    pub fn levels(&self) -> impl Iterator<Item = SeverityLevel> + '_ {
        self.clusters.iter().map(|&c| self.model.level_of(c))
    }
}

/// Fits scaler, clusterer and label map for one cancer-type partition
pub struct SeverityTrainer {
    config: TrainingConfig,
}

impl SeverityTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Fit on the covariate-complete rows of one partition of the cohort
    pub fn fit_type(&self, cohort: &Cohort, cancer_type: &str) -> Result<TrainedPartition> {
        let matrix = CovariateMatrix::from_records(cohort.partition(cancer_type));
        self.fit(cancer_type, matrix)
    }

    /// Fit on an already filtered covariate matrix
    pub fn fit(&self, cancer_type: &str, matrix: CovariateMatrix) -> Result<TrainedPartition> {
        let n_clusters = self.config.n_clusters;
        if n_clusters != SeverityLevel::ORDERED.len() {
            return Err(StrataError::UnsupportedClusterCount(n_clusters));
        }

        if matrix.len() < n_clusters {
            return Err(StrataError::InsufficientData {
                cancer_type: cancer_type.to_string(),
                found: matrix.len(),
                required: n_clusters,
            });
        }

        let scaler = StandardScaler::fit(&matrix.rows);
        let scaled = scaler.transform(&matrix.rows);
        let distinct = distinct_rows(&scaled);
        if distinct < n_clusters {
            debug!(
                "'{}' has {} rows but only {} distinct",
                cancer_type,
                matrix.len(),
                distinct
            );
            return Err(StrataError::InsufficientData {
                cancer_type: cancer_type.to_string(),
                found: distinct,
                required: n_clusters,
            });
        }
        let fit = KMeans::fit(&scaled, n_clusters, &self.config)?;

        let label_map = rank_clusters(&matrix.rows, &fit.labels, &fit.model, &scaler);
        debug!("Label map for '{}': {:?}", cancer_type, label_map);
        info!(
            "Clustered {} rows of '{}' (inertia {:.4})",
            matrix.len(),
            cancer_type,
            fit.model.inertia
        );

        Ok(TrainedPartition {
            model: SeverityModel {
                cancer_type: cancer_type.to_string(),
                scaler,
                kmeans: fit.model,
                label_map,
            },
            matrix,
            clusters: fit.labels,
        })
    }
}

/// Rank clusters by mean prognostic index and assign low, medium, high.
///
/// Ties keep cluster index order. A cluster with no members is ranked by its
/// centroid mapped back to original units so every index gets a label.
pub fn rank_clusters(
    rows: &[[f64; NUM_FEATURES]],
    clusters: &[usize],
    kmeans: &KMeans,
    scaler: &StandardScaler,
) -> LabelMap {
    let k = kmeans.n_clusters();
    let mut sums = vec![0.0f64; k];
    let mut counts = vec![0usize; k];
    for (row, &c) in rows.iter().zip(clusters) {
        sums[c] += row[NPI_INDEX];
        counts[c] += 1;
    }

    let mut ranked: Vec<(usize, f64)> = (0..k)
        .map(|c| {
            let mean = if counts[c] > 0 {
                sums[c] / counts[c] as f64
            } else {
                scaler.inverse_value(NPI_INDEX, kmeans.centroids[[c, NPI_INDEX]])
            };
            (c, mean)
        })
        .collect();
    ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));

    ranked
        .into_iter()
        .zip(SeverityLevel::ORDERED)
        .map(|((cluster, _), level)| (cluster, level))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PatientRecord;
    use ndarray::Array2;

    fn patient(id: &str, cancer_type: &str, covariates: [f64; NUM_FEATURES]) -> PatientRecord {
        let mut r = PatientRecord::new(id);
        r.cancer_type = Some(cancer_type.to_string());
        r.tumor_size = Some(covariates[0]);
        r.histologic_grade = Some(covariates[1]);
        r.lymph_nodes_positive = Some(covariates[2]);
        r.mutation_count = Some(covariates[3]);
        r.npi = Some(covariates[4]);
        r
    }

    fn mean_npi(partition: &TrainedPartition, level: SeverityLevel) -> f64 {
        let values: Vec<f64> = partition
            .matrix
            .rows
            .iter()
            .zip(partition.levels())
            .filter(|(_, l)| *l == level)
            .map(|(row, _)| row[NPI_INDEX])
            .collect();
        values.iter().sum::<f64>() / values.len() as f64
    }

    #[test]
    fn test_three_rows_labeled_by_ascending_npi() {
        let cohort = Cohort::new(vec![
            patient("P1", "TypeA", [10.0, 1.0, 0.0, 1.0, 1.0]),
            patient("P2", "TypeA", [30.0, 2.0, 5.0, 6.0, 5.0]),
            patient("P3", "TypeA", [60.0, 3.0, 15.0, 12.0, 9.0]),
        ]);

        let trained = SeverityTrainer::new(TrainingConfig::default())
            .fit_type(&cohort, "TypeA")
            .unwrap();

        let levels: Vec<SeverityLevel> = trained.levels().collect();
        assert_eq!(
            levels,
            vec![SeverityLevel::Low, SeverityLevel::Medium, SeverityLevel::High]
        );
        let mut clusters = trained.clusters.clone();
        clusters.sort_unstable();
        assert_eq!(clusters, vec![0, 1, 2]);
    }

    #[test]
    fn test_label_map_is_monotonic_in_npi() {
        let mut records = Vec::new();
        for i in 0..30 {
            let group = (i % 3) as f64;
            let jitter = (i as f64) * 0.01;
            records.push(patient(
                &format!("P{}", i),
                "Ductal",
                [
                    15.0 + 20.0 * group + jitter,
                    1.0 + group,
                    4.0 * group,
                    2.0 + 3.0 * group,
                    2.5 + 1.5 * group + jitter,
                ],
            ));
        }
        let cohort = Cohort::new(records);
        let trained = SeverityTrainer::new(TrainingConfig::default())
            .fit_type(&cohort, "Ductal")
            .unwrap();

        let keys: Vec<usize> = trained.model.label_map.keys().copied().collect();
        assert_eq!(keys, vec![0, 1, 2]);

        let low = mean_npi(&trained, SeverityLevel::Low);
        let medium = mean_npi(&trained, SeverityLevel::Medium);
        let high = mean_npi(&trained, SeverityLevel::High);
        assert!(low <= medium && medium <= high);
    }

    #[test]
    fn test_rejects_other_cluster_counts() {
        let cohort = Cohort::new(vec![patient("P1", "A", [1.0; NUM_FEATURES])]);
        let trainer = SeverityTrainer::new(TrainingConfig::default().with_n_clusters(4));
        let err = trainer.fit_type(&cohort, "A").unwrap_err();
        assert!(matches!(err, StrataError::UnsupportedClusterCount(4)));
    }

    #[test]
    fn test_insufficient_rows() {
        let mut incomplete = patient("P3", "A", [1.0; NUM_FEATURES]);
        incomplete.mutation_count = None;
        let cohort = Cohort::new(vec![
            patient("P1", "A", [1.0; NUM_FEATURES]),
            patient("P2", "A", [2.0; NUM_FEATURES]),
            incomplete,
        ]);

        let err = SeverityTrainer::new(TrainingConfig::default())
            .fit_type(&cohort, "A")
            .unwrap_err();
        match err {
            StrataError::InsufficientData { found, required, .. } => {
                assert_eq!(found, 2);
                assert_eq!(required, 3);
            }
            other => panic!("Expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_rows_are_insufficient() {
        let cohort = Cohort::new(vec![
            patient("P1", "A", [1.0; NUM_FEATURES]),
            patient("P2", "A", [1.0; NUM_FEATURES]),
            patient("P3", "A", [2.0; NUM_FEATURES]),
            patient("P4", "A", [2.0; NUM_FEATURES]),
        ]);

        let err = SeverityTrainer::new(TrainingConfig::default())
            .fit_type(&cohort, "A")
            .unwrap_err();
        match err {
            StrataError::InsufficientData { found, .. } => assert_eq!(found, 2),
            other => panic!("Expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_cluster_still_labeled() {
        let mut centroids = Array2::zeros((3, NUM_FEATURES));
        centroids.row_mut(2).fill(1.0);
        let kmeans = KMeans {
            centroids,
            inertia: 0.0,
        };
        let scaler = StandardScaler {
            means: vec![0.0; NUM_FEATURES],
            scales: vec![1.0; NUM_FEATURES],
        };
        let rows = [[0.0; NUM_FEATURES], [0.0; NUM_FEATURES]];
        let map = rank_clusters(&rows, &[0, 0], &kmeans, &scaler);

        assert_eq!(map.len(), 3);
        // Cluster 1 ties cluster 0 at NPI 0.0 and ranks after it by index
        assert_eq!(map[&0], SeverityLevel::Low);
        assert_eq!(map[&1], SeverityLevel::Medium);
        assert_eq!(map[&2], SeverityLevel::High);
    }
}
