//! Fixed-k clustering backed by `linfa-clustering`.
//!
//! Fitting runs linfa's k-means (k-means++ seeding, `n_init` restarts) on a
//! seeded `ChaCha8Rng`. Only the centroids and inertia are persisted, so a
//! loaded model assigns rows without refitting.

use crate::error::Result;
use crate::training::TrainingConfig;
use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::{KMeans as LinfaKMeans, KMeansError};
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fitted k-means clusterer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeans {
    /// Cluster centers in scaled feature space, one per row
    pub centroids: Array2<f64>,
    /// Sum of squared distances of samples to their closest center
    pub inertia: f64,
}

/// Result of fitting: the model plus the training assignments
#[derive(Debug, Clone)]
pub struct KMeansFit {
    pub model: KMeans,
    /// Cluster index of each training row
    pub labels: Vec<usize>,
}

impl KMeans {
    /// Fit `n_clusters` centers on scaled rows.
    ///
    /// Callers guarantee at least `n_clusters` distinct rows.
    pub fn fit(data: &Array2<f64>, n_clusters: usize, config: &TrainingConfig) -> Result<KMeansFit> {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let dataset = DatasetBase::from(data.clone());

        let fitted: std::result::Result<LinfaKMeans<f64, L2Dist>, KMeansError> =
            LinfaKMeans::params_with_rng(n_clusters, rng)
                .n_runs(config.n_init.max(1))
                .max_n_iterations(config.max_iter.max(1) as u64)
                .tolerance(config.tolerance)
                .fit(&dataset);
        let fitted = fitted?;

        let labels: Array1<usize> = fitted.predict(data);
        let model = KMeans {
            centroids: fitted.centroids().to_owned(),
            inertia: fitted.inertia(),
        };
        debug!(
            "k-means on {} rows: inertia={:.6}",
            data.nrows(),
            model.inertia
        );

        Ok(KMeansFit {
            model,
            labels: labels.to_vec(),
        })
    }

    /// Number of clusters
    pub fn n_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    /// Number of features per center
    pub fn n_features(&self) -> usize {
        self.centroids.ncols()
    }

    /// Index of the nearest center; ties go to the lowest index
    pub fn predict(&self, row: &[f64]) -> usize {
        let distances = self.transform(row);
        let mut best = 0;
        for (idx, &d) in distances.iter().enumerate() {
            if d < distances[best] {
                best = idx;
            }
        }
        best
    }

    /// Euclidean distance from the row to every center
    pub fn transform(&self, row: &[f64]) -> Array1<f64> {
        let row = ArrayView1::from(row);
        self.centroids
            .axis_iter(Axis(0))
            .map(|centroid| (&centroid - &row).mapv(|d| d * d).sum().sqrt())
            .collect()
    }
}

/// Number of distinct rows, compared exactly
pub fn distinct_rows(data: &Array2<f64>) -> usize {
    let mut seen: Vec<Vec<u64>> = data
        .axis_iter(Axis(0))
        .map(|row| row.iter().map(|v| v.to_bits()).collect())
        .collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}
