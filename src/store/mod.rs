//! Per-cancer-type model store.
//!
//! Owns every trained [`SeverityModel`], keyed by cancer type. Models come
//! from training or from persisted artifacts and are replaced wholesale.
//! Training and loading for one key are serialized by a per-key lock, so
//! concurrent requests for the same untrained type fit it only once.

use crate::data::Cohort;
use crate::error::Result;
use crate::model::artifact::{ArtifactMetadata, ArtifactStore};
use crate::model::SeverityModel;
use crate::training::trainer::SeverityTrainer;
use crate::training::{SkippedType, TrainAllReport, TrainingConfig};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Shared store of trained severity models
pub struct ModelStore {
    cohort: Arc<Cohort>,
    artifacts: ArtifactStore,
    config: TrainingConfig,
    cache: RwLock<HashMap<String, Arc<SeverityModel>>>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ModelStore {
    /// Create an empty store over a loaded cohort
    pub fn new(cohort: Arc<Cohort>, artifacts: ArtifactStore, config: TrainingConfig) -> Self {
        Self {
            cohort,
            artifacts,
            config,
            cache: RwLock::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Sorted cancer types present in the cohort
    pub fn available_types(&self) -> Vec<String> {
        self.cohort.available_types().to_vec()
    }

    /// Sorted cancer types currently held in memory
    pub fn cached_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.cache.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Cached model, if any
    pub fn get(&self, cancer_type: &str) -> Option<Arc<SeverityModel>> {
        self.cache.read().get(cancer_type).cloned()
    }

    /// Train one cancer type with the configured cluster count.
    ///
    /// Without `force`, existing artifacts are loaded instead.
    pub fn train(&self, cancer_type: &str, force: bool) -> Result<Arc<SeverityModel>> {
        self.train_with_clusters(cancer_type, self.config().n_clusters, force)
    }

    /// Train one cancer type with an explicit cluster count
    pub fn train_with_clusters(
        &self,
        cancer_type: &str,
        n_clusters: usize,
        force: bool,
    ) -> Result<Arc<SeverityModel>> {
        let result = {
            let lock = self.key_lock(cancer_type);
            let _guard = lock.lock();
            self.train_locked(cancer_type, n_clusters, force)
        };
        self.release_if_failed(cancer_type, &result);
        result
    }

    /// Load persisted artifacts into the cache
    pub fn load(&self, cancer_type: &str) -> Result<Arc<SeverityModel>> {
        let result = {
            let lock = self.key_lock(cancer_type);
            let _guard = lock.lock();
            self.load_locked(cancer_type)
        };
        self.release_if_failed(cancer_type, &result);
        result
    }

    /// Cached model, else persisted artifacts, else train on the fly
    pub fn get_or_train(&self, cancer_type: &str) -> Result<Arc<SeverityModel>> {
        if let Some(model) = self.get(cancer_type) {
            return Ok(model);
        }

        let result = {
            let lock = self.key_lock(cancer_type);
            let _guard = lock.lock();

            // Another caller may have finished while we waited
            if let Some(model) = self.get(cancer_type) {
                return Ok(model);
            }

            match self.load_locked(cancer_type) {
                Ok(model) => Ok(model),
                Err(e) if e.is_artifact_not_found() => {
                    info!("No model for '{}' in store, training on the fly", cancer_type);
                    self.train_locked(cancer_type, self.config().n_clusters, false)
                }
                Err(e) => Err(e),
            }
        };
        self.release_if_failed(cancer_type, &result);
        result
    }

    /// Train every available type, or the given subset.
    ///
    /// Per-type failures are logged and reported, never fatal to the batch.
    pub fn train_all(&self, cancer_types: Option<&[String]>, force: bool) -> TrainAllReport {
        let start = Instant::now();
        let types: Vec<String> = match cancer_types {
            Some(types) => types.to_vec(),
            None => self.available_types(),
        };

        let progress = ProgressBar::new(types.len() as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner} [{bar:40}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut report = TrainAllReport::default();
        for cancer_type in types {
            progress.set_message(cancer_type.clone());
            match self.train(&cancer_type, force) {
                Ok(_) => report.trained.push(cancer_type),
                Err(e) => {
                    warn!("Skipping training for '{}': {}", cancer_type, e);
                    report.skipped.push(SkippedType {
                        cancer_type,
                        reason: e.to_string(),
                    });
                }
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        report.duration_secs = start.elapsed().as_secs_f64();
        info!(
            "Trained {} cancer types, skipped {}",
            report.trained.len(),
            report.skipped.len()
        );
        report
    }

    /// Load every persisted artifact for the available types without training.
    ///
    /// Unreadable artifacts are logged and skipped; returns the number loaded.
    pub fn load_all(&self) -> usize {
        let mut loaded = 0;
        for cancer_type in self.cohort.available_types() {
            match self.load(cancer_type) {
                Ok(_) => loaded += 1,
                Err(e) if e.is_artifact_not_found() => {
                    info!("No saved model for '{}', skipping", cancer_type);
                }
                Err(e) => warn!("Skipping saved model for '{}': {}", cancer_type, e),
            }
        }
        loaded
    }

    fn key_lock(&self, cancer_type: &str) -> Arc<Mutex<()>> {
        self.key_locks
            .lock()
            .entry(cancer_type.to_string())
            .or_default()
            .clone()
    }

    /// Drop the lock entry of a failed type the cohort does not know, so
    /// arbitrary request strings do not accumulate
    fn release_if_failed<T>(&self, cancer_type: &str, result: &Result<T>) {
        let known = self
            .cohort
            .available_types()
            .iter()
            .any(|t| t == cancer_type);
        if result.is_err() && !known {
            self.key_locks.lock().remove(cancer_type);
        }
    }

    fn load_locked(&self, cancer_type: &str) -> Result<Arc<SeverityModel>> {
        let model = Arc::new(self.artifacts.load(cancer_type)?);
        self.cache
            .write()
            .insert(cancer_type.to_string(), Arc::clone(&model));
        Ok(model)
    }

    fn train_locked(
        &self,
        cancer_type: &str,
        n_clusters: usize,
        force: bool,
    ) -> Result<Arc<SeverityModel>> {
        if !force && self.artifacts.exists(cancer_type) {
            info!("Artifacts exist for '{}', loading instead of retraining", cancer_type);
            return self.load_locked(cancer_type);
        }

        let trainer = SeverityTrainer::new(self.config().clone().with_n_clusters(n_clusters));
        let trained = trainer.fit_type(&self.cohort, cancer_type)?;

        let metadata = ArtifactMetadata::for_model(&trained.model, trained.matrix.len());
        self.artifacts.save(&trained.model, &metadata)?;

        let model = Arc::new(trained.model);
        self.cache
            .write()
            .insert(cancer_type.to_string(), Arc::clone(&model));
        Ok(model)
    }
}

impl std::fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStore")
            .field("models_dir", &self.artifacts.models_dir())
            .field("cached", &self.cached_types())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::PatientRecord;
    use crate::error::StrataError;
    use std::thread;
    use tempfile::TempDir;

    /// Three well separated severity groups per listed type
    pub(crate) fn synthetic_cohort() -> Cohort {
        let mut records = Vec::new();
        let mut id = 0;
        for (cancer_type, rows) in [("Ductal", 12), ("Lobular", 9), ("Mucinous", 2)] {
            for i in 0..rows {
                let group = (i % 3) as f64;
                let jitter = (i / 3) as f64 * 0.1;
                let mut r = PatientRecord::new(format!("MB-{:04}", id));
                r.cancer_type = Some(cancer_type.to_string());
                r.age_at_diagnosis = Some(45.0 + i as f64);
                r.tumor_size = Some(12.0 + 25.0 * group + jitter);
                r.histologic_grade = Some(1.0 + group);
                r.lymph_nodes_positive = Some(6.0 * group + jitter);
                r.mutation_count = Some(2.0 + 4.0 * group);
                r.npi = Some(2.2 + 1.8 * group + jitter);
                records.push(r);
                id += 1;
            }
        }
        // No cancer type and an incomplete row
        records.push(PatientRecord::new("MB-9998"));
        let mut incomplete = PatientRecord::new("MB-9999");
        incomplete.cancer_type = Some("Ductal".to_string());
        incomplete.npi = Some(9.0);
        records.push(incomplete);
        Cohort::new(records)
    }

    fn store_in(dir: &TempDir) -> ModelStore {
        ModelStore::new(
            Arc::new(synthetic_cohort()),
            ArtifactStore::new(dir.path()).unwrap(),
            TrainingConfig::default(),
        )
    }

    #[test]
    fn test_train_persists_and_caches() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let model = store.train("Ductal", false).unwrap();
        assert_eq!(model.label_map.len(), 3);
        assert!(store.artifacts().exists("Ductal"));
        assert_eq!(store.cached_types(), vec!["Ductal".to_string()]);
    }

    #[test]
    fn test_train_without_force_loads_existing() {
        let dir = TempDir::new().unwrap();
        let first = store_in(&dir).train("Lobular", false).unwrap();

        let fresh = store_in(&dir);
        let again = fresh.train("Lobular", false).unwrap();
        assert_eq!(*first, *again);

        let forced = fresh.train("Lobular", true).unwrap();
        assert_eq!(forced.label_map, first.label_map);
    }

    #[test]
    fn test_insufficient_data() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let err = store.train("Mucinous", false).unwrap_err();
        assert!(err.is_insufficient_data());
        assert!(!store.artifacts().exists("Mucinous"));
    }

    #[test]
    fn test_load_without_artifacts() {
        let dir = TempDir::new().unwrap();
        let err = store_in(&dir).load("Ductal").unwrap_err();
        assert!(err.is_artifact_not_found());
    }

    #[test]
    fn test_get_or_train_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let a = store.get_or_train("Ductal").unwrap();
        let b = store.get_or_train("Ductal").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        // A second store reads the same fitted parameters back from disk
        let c = store_in(&dir).get_or_train("Ductal").unwrap();
        assert_eq!(*a, *c);
    }

    #[test]
    fn test_get_or_train_unknown_type() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(!store.available_types().contains(&"Phyllodes".to_string()));
        let err = store.get_or_train("Phyllodes").unwrap_err();
        match err {
            StrataError::InsufficientData { found, .. } => assert_eq!(found, 0),
            other => panic!("Expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_train_all_skips_failures() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let report = store.train_all(None, false);
        assert_eq!(report.trained, vec!["Ductal".to_string(), "Lobular".to_string()]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].cancer_type, "Mucinous");

        let subset = vec!["Lobular".to_string()];
        let report = store.train_all(Some(subset.as_slice()), true);
        assert_eq!(report.trained, subset);
    }

    #[test]
    fn test_load_all() {
        let dir = TempDir::new().unwrap();
        store_in(&dir).train_all(None, false);

        let fresh = store_in(&dir);
        assert_eq!(fresh.load_all(), 2);
        assert_eq!(
            fresh.cached_types(),
            vec!["Ductal".to_string(), "Lobular".to_string()]
        );
    }

    #[test]
    fn test_load_all_skips_corrupt_artifact() {
        let dir = TempDir::new().unwrap();
        store_in(&dir).train_all(None, false);
        let kmeans = store_in(&dir).artifacts().dir_for("Lobular").join("kmeans.json");
        std::fs::write(kmeans, "not json").unwrap();

        let fresh = store_in(&dir);
        assert_eq!(fresh.load_all(), 1);
        assert_eq!(fresh.cached_types(), vec!["Ductal".to_string()]);
        // Other types are unaffected
        assert!(fresh.get_or_train("Ductal").is_ok());
    }

    #[test]
    fn test_case_variant_does_not_reuse_model() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.train("Ductal", false).unwrap();

        assert!(!store.available_types().contains(&"ductal".to_string()));
        let err = store.get_or_train("ductal").unwrap_err();
        assert!(err.is_insufficient_data());
        assert!(store.get("ductal").is_none());
        assert!(store.load("Ductal").is_ok());
    }

    #[test]
    fn test_unknown_types_do_not_keep_locks() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        for i in 0..5 {
            assert!(store.get_or_train(&format!("Unknown {}", i)).is_err());
        }
        assert!(store.load("Phyllodes").is_err());
        assert!(store.key_locks.lock().is_empty());

        store.get_or_train("Ductal").unwrap();
        assert_eq!(store.key_locks.lock().len(), 1);
    }

    #[test]
    fn test_forced_retrain_while_loading() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store_in(&dir));
        let original = store.train("Lobular", false).unwrap();

        let trainer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..5 {
                    store.train("Lobular", true).unwrap();
                }
            })
        };
        let loaders: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..10)
                        .map(|_| store.load("Lobular").unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        trainer.join().unwrap();
        for loader in loaders {
            // Every read sees a complete triple, old or new
            for model in loader.join().unwrap() {
                assert_eq!(*model, *original);
            }
        }
    }

    #[test]
    fn test_unsupported_cluster_count() {
        let dir = TempDir::new().unwrap();
        let err = store_in(&dir)
            .train_with_clusters("Ductal", 4, true)
            .unwrap_err();
        assert!(matches!(err, StrataError::UnsupportedClusterCount(4)));
    }

    #[test]
    fn test_concurrent_get_or_train_shares_one_model() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store_in(&dir));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.get_or_train("Lobular").unwrap())
            })
            .collect();
        let models: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for model in &models[1..] {
            assert!(Arc::ptr_eq(&models[0], model));
        }
    }
}
