use crate::data::preprocessing::StandardScaler;
use crate::data::NUM_FEATURES;
use crate::error::{Result, StrataError};
use crate::model::kmeans::KMeans;
use crate::model::{LabelMap, SeverityModel};
use crate::utils::{ensure_dir, slugify};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const SCALER_FILE: &str = "scaler.json";
const KMEANS_FILE: &str = "kmeans.json";
const LABEL_MAP_FILE: &str = "label_map.json";
const METADATA_FILE: &str = "metadata.json";

/// Descriptive metadata written next to each artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Crate version that wrote the artifact
    pub version: String,
    /// Cancer type label; the directory name is only a slug, so this is
    /// what identifies the owner
    pub cancer_type: String,
    /// Number of rows the model was fitted on
    pub n_rows: usize,
    /// Number of clusters
    pub n_clusters: usize,
    /// Final k-means inertia
    pub inertia: f64,
    /// Seconds since the UNIX epoch
    pub created_at: u64,
}

impl ArtifactMetadata {
    pub fn for_model(model: &SeverityModel, n_rows: usize) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            version: crate::VERSION.to_string(),
            cancer_type: model.cancer_type.clone(),
            n_rows,
            n_clusters: model.kmeans.n_clusters(),
            inertia: model.kmeans.inertia,
            created_at,
        }
    }
}

/// On-disk store of per-cancer-type severity models
///
/// Layout: `<models_dir>/<slug>/{scaler,kmeans,label_map,metadata}.json`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    models_dir: PathBuf,
}

impl ArtifactStore {
    /// Open the store, creating the directory if needed
    pub fn new<P: AsRef<Path>>(models_dir: P) -> Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        ensure_dir(&models_dir)?;
        Ok(Self { models_dir })
    }

    /// Root directory of the store
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Artifact directory for a cancer type
    pub fn dir_for(&self, cancer_type: &str) -> PathBuf {
        self.models_dir.join(slugify(cancer_type))
    }

    /// Check whether a complete artifact written for exactly this type exists
    pub fn exists(&self, cancer_type: &str) -> bool {
        has_required_files(&self.dir_for(cancer_type))
            && matches!(
                self.metadata(cancer_type),
                Ok(Some(ref m)) if m.cancer_type == cancer_type
            )
    }

    /// Persist a model, replacing any previous artifact of the same type
    pub fn save(&self, model: &SeverityModel, metadata: &ArtifactMetadata) -> Result<PathBuf> {
        let slug = slugify(&model.cancer_type);
        let target = self.models_dir.join(&slug);

        if let Ok(Some(owner)) = self.metadata(&model.cancer_type) {
            if owner.cancer_type != model.cancer_type {
                return Err(StrataError::ArtifactConflict {
                    cancer_type: model.cancer_type.clone(),
                    owner: owner.cancer_type,
                    dir: target,
                });
            }
        }

        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}-staging-", slug))
            .tempdir_in(&self.models_dir)?;
        write_json(&staging.path().join(SCALER_FILE), &model.scaler)?;
        write_json(&staging.path().join(KMEANS_FILE), &model.kmeans)?;
        write_json(&staging.path().join(LABEL_MAP_FILE), &model.label_map)?;
        write_json(&staging.path().join(METADATA_FILE), metadata)?;

        // Dropping `retired` deletes the replaced artifact
        let retired = tempfile::Builder::new()
            .prefix(&format!(".{}-retired-", slug))
            .tempdir_in(&self.models_dir)?;
        install(staging.path(), &target, &retired.path().join(&slug))?;

        info!("Saved artifacts for '{}' at {:?}", model.cancer_type, target);
        Ok(target)
    }

    /// Load a persisted model
    pub fn load(&self, cancer_type: &str) -> Result<SeverityModel> {
        let dir = self.dir_for(cancer_type);
        let not_found = || StrataError::ArtifactNotFound {
            cancer_type: cancer_type.to_string(),
            dir: dir.clone(),
        };
        if !has_required_files(&dir) {
            return Err(not_found());
        }
        match self.metadata(cancer_type)? {
            Some(m) if m.cancer_type == cancer_type => {}
            Some(m) => {
                warn!(
                    "Artifacts at {:?} belong to '{}', not '{}'",
                    dir, m.cancer_type, cancer_type
                );
                return Err(not_found());
            }
            None => {
                warn!("Artifacts at {:?} have no metadata, ignoring", dir);
                return Err(not_found());
            }
        }

        let scaler: StandardScaler = read_json(&dir.join(SCALER_FILE))?;
        let kmeans: KMeans = read_json(&dir.join(KMEANS_FILE))?;
        let label_map: LabelMap = read_json(&dir.join(LABEL_MAP_FILE))?;

        validate(cancer_type, &scaler, &kmeans, &label_map)?;

        info!("Loaded artifacts for '{}' from {:?}", cancer_type, dir);
        Ok(SeverityModel {
            cancer_type: cancer_type.to_string(),
            scaler,
            kmeans,
            label_map,
        })
    }

    /// Read the metadata of a persisted model, if present
    pub fn metadata(&self, cancer_type: &str) -> Result<Option<ArtifactMetadata>> {
        let path = self.dir_for(cancer_type).join(METADATA_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }
}

fn has_required_files(dir: &Path) -> bool {
    [SCALER_FILE, KMEANS_FILE, LABEL_MAP_FILE]
        .iter()
        .all(|f| dir.join(f).is_file())
}

/// Move `staging` to `target`, parking any existing `target` at `retired`.
///
/// If the final rename fails the parked artifact is moved back.
fn install(staging: &Path, target: &Path, retired: &Path) -> io::Result<()> {
    let parked = target.exists();
    if parked {
        debug!("Retiring previous artifact at {:?}", target);
        fs::rename(target, retired)?;
    }

    if let Err(e) = fs::rename(staging, target) {
        if parked {
            if let Err(restore) = fs::rename(retired, target) {
                warn!(
                    "Could not restore previous artifact at {:?}: {}",
                    target, restore
                );
            }
        }
        return Err(e);
    }
    Ok(())
}

fn validate(
    cancer_type: &str,
    scaler: &StandardScaler,
    kmeans: &KMeans,
    label_map: &LabelMap,
) -> Result<()> {
    let corrupt = |what: &str| {
        StrataError::Parse(format!("Corrupt artifact for '{}': {}", cancer_type, what))
    };

    if scaler.n_features() != NUM_FEATURES || scaler.scales.len() != NUM_FEATURES {
        return Err(corrupt("scaler feature count"));
    }
    if kmeans.n_features() != NUM_FEATURES {
        return Err(corrupt("centroid dimension"));
    }
    if !label_map.keys().copied().eq(0..kmeans.n_clusters()) {
        return Err(corrupt("label map keys do not match clusters"));
    }
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SeverityLevel;
    use ndarray::Array2;
    use tempfile::TempDir;

    fn create_test_model(cancer_type: &str, shift: f64) -> SeverityModel {
        let mut label_map = LabelMap::new();
        label_map.insert(0, SeverityLevel::Medium);
        label_map.insert(1, SeverityLevel::Low);
        label_map.insert(2, SeverityLevel::High);

        let mut centroids = Array2::from_elem((3, NUM_FEATURES), shift);
        centroids.row_mut(1).fill(-1.0);
        centroids.row_mut(2).fill(1.0);

        SeverityModel {
            cancer_type: cancer_type.to_string(),
            scaler: StandardScaler {
                means: vec![25.0, 2.0, 2.0, 5.0, 4.0],
                scales: vec![10.0, 0.7, 4.0, 3.0, 1.1],
            },
            kmeans: KMeans {
                centroids,
                inertia: 12.5,
            },
            label_map,
        }
    }

    fn save(store: &ArtifactStore, model: &SeverityModel) -> Result<PathBuf> {
        store.save(model, &ArtifactMetadata::for_model(model, 10))
    }

    #[test]
    fn test_artifact_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path()).unwrap();
        let model = create_test_model("Breast Invasive Lobular Carcinoma", 0.0);

        assert!(!store.exists(&model.cancer_type));
        let dir = store
            .save(&model, &ArtifactMetadata::for_model(&model, 40))
            .unwrap();

        assert_eq!(dir, temp_dir.path().join("breast_invasive_lobular_carcinoma"));
        assert!(store.exists(&model.cancer_type));

        let loaded = store.load(&model.cancer_type).unwrap();
        assert_eq!(loaded, model);

        let metadata = store.metadata(&model.cancer_type).unwrap().unwrap();
        assert_eq!(metadata.n_rows, 40);
        assert_eq!(metadata.cancer_type, model.cancer_type);
    }

    #[test]
    fn test_save_replaces_previous_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path()).unwrap();

        save(&store, &create_test_model("Breast", 0.0)).unwrap();
        let second = create_test_model("Breast", 0.5);
        save(&store, &second).unwrap();

        assert_eq!(store.load("Breast").unwrap(), second);

        // Only the live artifact directory is left behind
        let entries: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("breast")]);
    }

    #[test]
    fn test_load_missing_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path()).unwrap();

        let err = store.load("Metaplastic Breast Cancer").unwrap_err();
        assert!(err.is_artifact_not_found());
    }

    #[test]
    fn test_slug_sibling_does_not_load_other_model() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path()).unwrap();
        save(&store, &create_test_model("Ductal", 0.0)).unwrap();

        // "ductal" shares the directory but not the owner
        assert_eq!(store.dir_for("ductal"), store.dir_for("Ductal"));
        assert!(!store.exists("ductal"));
        assert!(store.load("ductal").unwrap_err().is_artifact_not_found());

        let err = save(&store, &create_test_model("ductal", 0.0)).unwrap_err();
        assert!(matches!(err, StrataError::ArtifactConflict { .. }));
        assert!(store.load("Ductal").is_ok());
    }

    #[test]
    fn test_artifact_without_metadata_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path()).unwrap();
        let dir = save(&store, &create_test_model("Breast", 0.0)).unwrap();
        fs::remove_file(dir.join(METADATA_FILE)).unwrap();

        assert!(!store.exists("Breast"));
        assert!(store.load("Breast").unwrap_err().is_artifact_not_found());
    }

    #[test]
    fn test_failed_install_restores_previous_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("breast");
        fs::create_dir(&target).unwrap();
        fs::write(target.join(SCALER_FILE), "{}").unwrap();
        let retired = TempDir::new_in(temp_dir.path()).unwrap();

        // Staging directory vanished, so the second rename fails
        let missing = temp_dir.path().join("staging-gone");
        assert!(install(&missing, &target, &retired.path().join("breast")).is_err());

        assert_eq!(fs::read_to_string(target.join(SCALER_FILE)).unwrap(), "{}");
    }

    #[test]
    fn test_load_rejects_mismatched_label_map() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path()).unwrap();
        let mut model = create_test_model("Breast", 0.0);
        model.label_map.remove(&2);
        save(&store, &model).unwrap();

        assert!(matches!(store.load("Breast"), Err(StrataError::Parse(_))));
    }
}
