use crate::data::{FEATURE_COLUMNS, NUM_FEATURES};
use crate::error::{Result, StrataError};
use crate::model::{SeverityLevel, SeverityModel};
use crate::store::ModelStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Cancer type used when a request names none
pub const DEFAULT_CANCER_TYPE: &str = "Breast Invasive Ductal Carcinoma";

/// JSON key a request may use to carry its cancer type
pub const CANCER_TYPE_KEY: &str = "Cancer Type";

/// Severity prediction for one patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityPrediction {
    /// Assigned aggressivity level
    pub severity_level: SeverityLevel,
    /// Raw cluster index
    pub cluster: usize,
    /// Normalized inverse-distance score in [0, 1]
    pub confidence: f64,
    pub cancer_type: String,
}

/// Raw covariate values keyed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureInput {
    values: HashMap<String, f64>,
}

impl FeatureInput {
    /// Build from a JSON object, accepting numbers and numeric strings.
    ///
    /// Only the severity covariates are read; other keys are ignored.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            StrataError::Parse("prediction input must be a JSON object".to_string())
        })?;

        let mut values = HashMap::new();
        for name in FEATURE_COLUMNS {
            let Some(raw) = object.get(name) else {
                continue;
            };
            let parsed = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            match parsed {
                Some(v) => {
                    values.insert(name.to_string(), v);
                }
                None => {
                    return Err(StrataError::InvalidFeature {
                        name: name.to_string(),
                        value: raw.to_string(),
                    })
                }
            }
        }

        Ok(Self { values })
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// Covariates in clustering order, validated
    pub fn covariates(&self) -> Result<[f64; NUM_FEATURES]> {
        let mut out = [0.0; NUM_FEATURES];
        for (slot, name) in out.iter_mut().zip(FEATURE_COLUMNS) {
            let value = *self
                .values
                .get(name)
                .ok_or_else(|| StrataError::MissingFeature(name.to_string()))?;
            if !value.is_finite() {
                return Err(StrataError::InvalidFeature {
                    name: name.to_string(),
                    value: value.to_string(),
                });
            }
            *slot = value;
        }
        Ok(out)
    }
}

/// Resolve the model for `cancer_type` and classify one patient
pub fn predict_severity(
    store: &ModelStore,
    features: &FeatureInput,
    cancer_type: &str,
) -> Result<SeverityPrediction> {
    let model = store.get_or_train(cancer_type)?;
    predict_with_model(&model, features)
}

/// Classify one patient with an already resolved model
pub fn predict_with_model(model: &SeverityModel, features: &FeatureInput) -> Result<SeverityPrediction> {
    let covariates = features.covariates()?;
    let scaled = model.scaler.transform_row(&covariates);
    let distances = model.kmeans.transform(&scaled);

    // Finite raw values can still overflow once scaled or squared
    if let Some(idx) = scaled.iter().position(|v| !v.is_finite()) {
        return Err(out_of_range(idx, covariates[idx]));
    }
    if !distances.iter().all(|d| d.is_finite()) {
        let idx = scaled
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map_or(0, |(idx, _)| idx);
        return Err(out_of_range(idx, covariates[idx]));
    }

    let cluster = model.kmeans.predict(&scaled);
    let confidence = confidence(distances.as_slice().unwrap_or(&[]), cluster);
    debug!(
        "Cluster {} for '{}' (distances {:?})",
        cluster, model.cancer_type, distances
    );

    Ok(SeverityPrediction {
        severity_level: model.level_of(cluster),
        cluster,
        confidence,
        cancer_type: model.cancer_type.clone(),
    })
}

fn out_of_range(idx: usize, value: f64) -> StrataError {
    StrataError::InvalidFeature {
        name: FEATURE_COLUMNS[idx].to_string(),
        value: format!("{} (out of range for this model)", value),
    }
}

/// `1 - d_assigned / sum(d)`, clamped to [0, 1]; 1.0 when all distances are
/// zero and 0.0 when the ratio is undefined
pub fn confidence(distances: &[f64], cluster: usize) -> f64 {
    let total: f64 = distances.iter().sum();
    if total == 0.0 {
        return 1.0;
    }
    let score = 1.0 - distances.get(cluster).copied().unwrap_or(f64::NAN) / total;
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}
