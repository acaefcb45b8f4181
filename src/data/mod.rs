pub mod loader;
pub mod preprocessing;

pub use loader::DataLoader;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Number of severity covariates used for clustering
pub const NUM_FEATURES: usize = 5;

/// Severity covariate column names, in clustering order
pub const FEATURE_COLUMNS: [&str; NUM_FEATURES] = [
    "Tumor Size",
    "Neoplasm Histologic Grade",
    "Lymph nodes examined positive",
    "Mutation Count",
    "Nottingham prognostic index",
];

/// Index of the Nottingham prognostic index within `FEATURE_COLUMNS`
pub const NPI_INDEX: usize = 4;

/// Identifying columns that must be present in the source table
pub const INFO_COLUMNS: [&str; 3] = ["Patient ID", "Cancer Type Detailed", "Age at Diagnosis"];

/// Optional biomarker columns
pub const BIOMARKER_COLUMNS: [&str; 3] = ["HER2 Status", "ER Status", "PR Status"];

/// Minimum covariate-complete rows for a partition to be stratified
pub const MIN_PARTITION_ROWS: usize = 3;

/// One patient row of the source table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Patient ID
    pub patient_id: String,
    /// Detailed cancer type label
    pub cancer_type: Option<String>,
    /// Age at diagnosis
    pub age_at_diagnosis: Option<f64>,

    // Severity covariates
    pub tumor_size: Option<f64>,
    pub histologic_grade: Option<f64>,
    pub lymph_nodes_positive: Option<f64>,
    pub mutation_count: Option<f64>,
    /// Nottingham prognostic index
    pub npi: Option<f64>,

    // Biomarkers
    pub her2_status: Option<String>,
    pub er_status: Option<String>,
    pub pr_status: Option<String>,
}

impl PatientRecord {
    /// Create a record with only an ID set
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            cancer_type: None,
            age_at_diagnosis: None,
            tumor_size: None,
            histologic_grade: None,
            lymph_nodes_positive: None,
            mutation_count: None,
            npi: None,
            her2_status: None,
            er_status: None,
            pr_status: None,
        }
    }

    /// Covariates in `FEATURE_COLUMNS` order, or `None` if any is missing
    pub fn covariates(&self) -> Option<[f64; NUM_FEATURES]> {
        Some([
            self.tumor_size?,
            self.histologic_grade?,
            self.lymph_nodes_positive?,
            self.mutation_count?,
            self.npi?,
        ])
    }

    /// Check whether every severity covariate is present
    pub fn is_complete(&self) -> bool {
        self.covariates().is_some()
    }

    /// Check whether the record belongs to the given cancer type
    pub fn is_type(&self, cancer_type: &str) -> bool {
        self.cancer_type.as_deref() == Some(cancer_type)
    }
}

/// In-memory patient table, loaded once per process
#[derive(Debug, Clone, Default)]
pub struct Cohort {
    records: Vec<PatientRecord>,
    available_types: Vec<String>,
}

impl Cohort {
    /// Build a cohort and cache its sorted distinct cancer types
    pub fn new(records: Vec<PatientRecord>) -> Self {
        let available_types = records
            .iter()
            .filter_map(|r| r.cancer_type.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Self {
            records,
            available_types,
        }
    }

    /// Full table
    pub fn records(&self) -> &[PatientRecord] {
        &self.records
    }

    /// Rows that carry a cancer type
    pub fn cancer_records(&self) -> impl Iterator<Item = &PatientRecord> {
        self.records.iter().filter(|r| r.cancer_type.is_some())
    }

    /// Rows of one cancer type
    pub fn partition<'a>(&'a self, cancer_type: &'a str) -> impl Iterator<Item = &'a PatientRecord> {
        self.records.iter().filter(move |r| r.is_type(cancer_type))
    }

    /// Sorted distinct cancer types
    pub fn available_types(&self) -> &[String] {
        &self.available_types
    }

    /// Number of rows in the full table
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
