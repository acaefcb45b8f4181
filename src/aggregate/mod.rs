//! Population-wide aggressivity views.
//!
//! Every view re-clusters each cancer-type partition from scratch, so the
//! results never depend on which models happen to be persisted or cached.

use crate::data::preprocessing::CovariateMatrix;
use crate::data::{Cohort, PatientRecord, MIN_PARTITION_ROWS, NPI_INDEX, NUM_FEATURES};
use crate::error::Result;
use crate::model::SeverityLevel;
use crate::training::trainer::SeverityTrainer;
use crate::training::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// A patient with its on-the-fly severity assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityRow {
    #[serde(flatten)]
    pub record: PatientRecord,
    pub severity_level: SeverityLevel,
    pub cluster: usize,
}

/// Covariate means for one severity level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelStats {
    pub level: SeverityLevel,
    pub count: usize,
    pub avg_tumor_size: f64,
    pub avg_histologic_grade: f64,
    pub avg_lymph_nodes: f64,
    pub avg_mutation_count: f64,
    pub avg_npi: f64,
}

/// Number of patients of one cancer type at one level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeLevelCount {
    pub cancer_type: String,
    pub severity_level: SeverityLevel,
    pub count: usize,
}

/// Read-only aggregate views over a cohort
pub struct AggregateViews<'a> {
    cohort: &'a Cohort,
    trainer: SeverityTrainer,
}

impl<'a> AggregateViews<'a> {
    /// Views over `cohort`; the cluster count is always one per severity level
    pub fn new(cohort: &'a Cohort, config: TrainingConfig) -> Self {
        let config = config.with_n_clusters(SeverityLevel::ORDERED.len());
        Self {
            cohort,
            trainer: SeverityTrainer::new(config),
        }
    }

    /// Cluster every partition with enough complete rows, in dataset order
    pub fn stratify(&self) -> Result<Vec<SeverityRow>> {
        let records = self.cohort.records();
        let mut assigned: Vec<Option<(SeverityLevel, usize)>> = vec![None; records.len()];

        for cancer_type in self.cohort.available_types() {
            let positions: Vec<usize> = records
                .iter()
                .enumerate()
                .filter(|(_, r)| r.is_type(cancer_type))
                .map(|(idx, _)| idx)
                .collect();

            let matrix = CovariateMatrix::from_records(positions.iter().map(|&idx| &records[idx]));
            if matrix.len() < MIN_PARTITION_ROWS {
                debug!(
                    "Skipping '{}': {} complete rows",
                    cancer_type,
                    matrix.len()
                );
                continue;
            }

            let trained = self.trainer.fit(cancer_type, matrix)?;
            for ((&local, &cluster), level) in trained
                .matrix
                .indices
                .iter()
                .zip(&trained.clusters)
                .zip(trained.levels())
            {
                assigned[positions[local]] = Some((level, cluster));
            }
        }

        let rows: Vec<SeverityRow> = records
            .iter()
            .zip(assigned)
            .filter_map(|(record, assignment)| {
                assignment.map(|(severity_level, cluster)| SeverityRow {
                    record: record.clone(),
                    severity_level,
                    cluster,
                })
            })
            .collect();

        info!("Stratified {} of {} patients", rows.len(), records.len());
        Ok(rows)
    }

    /// Every labeled patient
    pub fn list_patients(&self) -> Result<Vec<SeverityRow>> {
        self.stratify()
    }

    /// Top `n` high-severity patients by prognostic index, descending
    pub fn top_severity(&self, n: usize) -> Result<Vec<SeverityRow>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut high: Vec<SeverityRow> = self
            .stratify()?
            .into_iter()
            .filter(|row| row.severity_level == SeverityLevel::High)
            .collect();
        high.sort_by(|a, b| {
            b.record
                .npi
                .partial_cmp(&a.record.npi)
                .unwrap_or(Ordering::Equal)
        });
        high.truncate(n);
        Ok(high)
    }

    /// Count and covariate means per level, for levels with members
    pub fn level_stats(&self) -> Result<Vec<LevelStats>> {
        let rows = self.stratify()?;

        let stats = SeverityLevel::ORDERED
            .into_iter()
            .filter_map(|level| {
                let covariates: Vec<[f64; NUM_FEATURES]> = rows
                    .iter()
                    .filter(|row| row.severity_level == level)
                    .filter_map(|row| row.record.covariates())
                    .collect();
                if covariates.is_empty() {
                    return None;
                }

                let n = covariates.len() as f64;
                let mean = |feature: usize| covariates.iter().map(|c| c[feature]).sum::<f64>() / n;
                Some(LevelStats {
                    level,
                    count: covariates.len(),
                    avg_tumor_size: mean(0),
                    avg_histologic_grade: mean(1),
                    avg_lymph_nodes: mean(2),
                    avg_mutation_count: mean(3),
                    avg_npi: mean(NPI_INDEX),
                })
            })
            .collect();

        Ok(stats)
    }

    /// Count per (cancer type, level), ordered by type then level
    pub fn counts_by_type(&self) -> Result<Vec<TypeLevelCount>> {
        let mut counts: BTreeMap<(String, SeverityLevel), usize> = BTreeMap::new();
        for row in self.stratify()? {
            if let Some(cancer_type) = row.record.cancer_type {
                *counts.entry((cancer_type, row.severity_level)).or_default() += 1;
            }
        }

        Ok(counts
            .into_iter()
            .map(|((cancer_type, severity_level), count)| TypeLevelCount {
                cancer_type,
                severity_level,
                count,
            })
            .collect())
    }

    /// Sorted distinct cancer types
    pub fn available_cancer_types(&self) -> Vec<String> {
        self.cohort.available_types().to_vec()
    }
}
