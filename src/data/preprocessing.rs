use crate::data::{PatientRecord, NUM_FEATURES};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Covariate-complete rows of a partition, with their positions in the input
#[derive(Debug, Clone, Default)]
pub struct CovariateMatrix {
    /// Position of each row in the iterator it was built from
    pub indices: Vec<usize>,
    /// Raw covariate values in `FEATURE_COLUMNS` order
    pub rows: Vec<[f64; NUM_FEATURES]>,
}

impl CovariateMatrix {
    /// Keep only rows where every covariate is present
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a PatientRecord>,
    {
        let mut matrix = Self::default();
        for (idx, record) in records.into_iter().enumerate() {
            if let Some(covariates) = record.covariates() {
                matrix.indices.push(idx);
                matrix.rows.push(covariates);
            }
        }
        matrix
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Z-score feature scaler (population standard deviation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Per-feature mean
    pub means: Vec<f64>,
    /// Per-feature scale; 1.0 for constant features
    pub scales: Vec<f64>,
}

impl StandardScaler {
    /// Compute means and scales from rows
    pub fn fit<const D: usize>(rows: &[[f64; D]]) -> Self {
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0f64; D];
        for row in rows {
            for (mean, &value) in means.iter_mut().zip(row) {
                *mean += value;
            }
        }
        for mean in &mut means {
            *mean /= n;
        }

        let mut scales = vec![0.0f64; D];
        for row in rows {
            for (i, &value) in row.iter().enumerate() {
                let diff = value - means[i];
                scales[i] += diff * diff;
            }
        }
        for scale in &mut scales {
            *scale = (*scale / n).sqrt();
            if *scale < 1e-12 {
                *scale = 1.0;
            }
        }

        debug!("Fitted scaler on {} rows", rows.len());
        Self { means, scales }
    }

    /// Number of features the scaler was fitted on
    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    /// Standardize a single row
    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(&value, (&mean, &scale))| (value - mean) / scale)
            .collect()
    }

    /// Standardize many rows into a samples-by-features matrix
    pub fn transform<const D: usize>(&self, rows: &[[f64; D]]) -> Array2<f64> {
        Array2::from_shape_fn((rows.len(), D), |(i, j)| {
            (rows[i][j] - self.means[j]) / self.scales[j]
        })
    }

    /// Map one standardized value back to original units
    pub fn inverse_value(&self, feature: usize, value: f64) -> f64 {
        value * self.scales[feature] + self.means[feature]
    }
}
