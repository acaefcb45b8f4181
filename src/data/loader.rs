use crate::data::{Cohort, PatientRecord, BIOMARKER_COLUMNS, FEATURE_COLUMNS, INFO_COLUMNS};
use crate::error::{Result, StrataError};
use csv::ReaderBuilder;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

/// Cell values treated as missing
const MISSING_MARKERS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Csv,
    Tsv,
    GzippedCsv,
    GzippedTsv,
}

impl FileFormat {
    /// Detect file format from path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str());
        let stem = path.file_stem().and_then(|s| s.to_str());

        match (ext, stem) {
            (Some("gz"), Some(stem)) => {
                if stem.ends_with(".csv") {
                    Ok(FileFormat::GzippedCsv)
                } else if stem.ends_with(".tsv") || stem.ends_with(".txt") {
                    Ok(FileFormat::GzippedTsv)
                } else {
                    Err(StrataError::Parse(format!(
                        "Cannot determine format of gzipped file {:?}",
                        path
                    )))
                }
            }
            (Some("csv"), _) => Ok(FileFormat::Csv),
            (Some("tsv"), _) | (Some("txt"), _) => Ok(FileFormat::Tsv),
            _ => Err(StrataError::Parse(format!("Unsupported file format: {:?}", path))),
        }
    }

    /// Get delimiter character
    pub fn delimiter(&self) -> u8 {
        match self {
            FileFormat::Csv | FileFormat::GzippedCsv => b',',
            FileFormat::Tsv | FileFormat::GzippedTsv => b'\t',
        }
    }

    /// Check if format is gzipped
    pub fn is_gzipped(&self) -> bool {
        matches!(self, FileFormat::GzippedCsv | FileFormat::GzippedTsv)
    }
}

/// Log progress every this many rows
const PROGRESS_EVERY: usize = 10000;

/// Loader for the patient table
#[derive(Debug, Clone, Copy, Default)]
pub struct DataLoader;

impl DataLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load the patient table into a cohort
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Cohort> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(StrataError::DataNotFound(path.to_path_buf()));
        }
        info!("Loading patient data from {:?}", path);

        let format = FileFormat::from_path(path)?;
        debug!("Detected file format: {:?}", format);

        let file = File::open(path)?;
        let records = if format.is_gzipped() {
            self.parse_records(BufReader::new(GzDecoder::new(file)), format)?
        } else {
            self.parse_records(BufReader::new(file), format)?
        };

        let cohort = Cohort::new(records);
        info!(
            "Loaded data: {} rows, cancer patients: {}",
            cohort.len(),
            cohort.cancer_records().count()
        );
        info!("Available cancer types: {}", cohort.available_types().len());
        Ok(cohort)
    }

    /// Parse records from reader, validating the header first
    pub(crate) fn parse_records<R: Read>(
        &self,
        reader: R,
        format: FileFormat,
    ) -> Result<Vec<PatientRecord>> {
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(format.delimiter())
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: HashMap<String, usize> = csv_reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim().to_string(), idx))
            .collect();

        let missing: Vec<String> = FEATURE_COLUMNS
            .iter()
            .chain(INFO_COLUMNS.iter())
            .filter(|col| !headers.contains_key(**col))
            .map(|col| col.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(StrataError::SchemaInvalid { missing });
        }

        debug!("Headers: {:?}", headers.keys().collect::<Vec<_>>());

        let mut records = Vec::new();
        for (line, result) in csv_reader.records().enumerate() {
            let row = result?;

            match parse_patient_record(&row, &headers) {
                Ok(record) => {
                    records.push(record);
                    if records.len() % PROGRESS_EVERY == 0 {
                        debug!("Loaded {} records...", records.len());
                    }
                }
                Err(e) => {
                    warn!("Skipping record at line {}: {}", line + 2, e);
                }
            }
        }

        Ok(records)
    }
}

/// Parse a single patient row
fn parse_patient_record(
    row: &csv::StringRecord,
    headers: &HashMap<String, usize>,
) -> Result<PatientRecord> {
    let get_text = |name: &str| -> Option<String> {
        headers
            .get(name)
            .and_then(|&idx| row.get(idx))
            .map(str::trim)
            .filter(|s| !MISSING_MARKERS.contains(s))
            .map(str::to_string)
    };

    let get_f64 = |name: &str| -> Result<Option<f64>> {
        match get_text(name) {
            None => Ok(None),
            Some(raw) => match raw.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(Some(v)),
                _ => Err(StrataError::Parse(format!(
                    "column '{}' has non-numeric value '{}'",
                    name, raw
                ))),
            },
        }
    };

    let patient_id = get_text("Patient ID")
        .ok_or_else(|| StrataError::Parse("missing Patient ID".to_string()))?;

    // Not a covariate, so a bad value only blanks the field
    let age_at_diagnosis = get_f64("Age at Diagnosis").unwrap_or_else(|e| {
        warn!("Patient {}: {}", patient_id, e);
        None
    });

    let mut record = PatientRecord::new(patient_id);
    record.cancer_type = get_text("Cancer Type Detailed");
    record.age_at_diagnosis = age_at_diagnosis;

    record.tumor_size = get_f64("Tumor Size")?;
    record.histologic_grade = get_f64("Neoplasm Histologic Grade")?;
    record.lymph_nodes_positive = get_f64("Lymph nodes examined positive")?;
    record.mutation_count = get_f64("Mutation Count")?;
    record.npi = get_f64("Nottingham prognostic index")?;

    let [her2, er, pr] = BIOMARKER_COLUMNS;
    record.her2_status = get_text(her2);
    record.er_status = get_text(er);
    record.pr_status = get_text(pr);

    Ok(record)
}
