use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use strata::cli::{parse_args, setup_logging, Cli, Commands, PredictArgs, TrainArgs};
use strata::model::artifact::ArtifactStore;
use strata::predict::{predict_severity, FeatureInput, CANCER_TYPE_KEY, DEFAULT_CANCER_TYPE};
use strata::utils::format_duration;
use strata::{AggregateViews, DataLoader, ModelStore, StrataConfig};
use tracing::{error, info};

fn main() {
    let cli = parse_args();

    setup_logging(cli.verbose);

    info!("{}", strata::info());

    if let Err(e) = run(cli) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let output = cli.command.output().output.clone();

    let cohort = DataLoader::new()
        .load(&config.data_path)
        .with_context(|| format!("Failed to load data from {:?}", config.data_path))?;

    match cli.command {
        Commands::Train(args) => {
            let store = build_store(&config, cohort)?;
            write_json(&run_train(&store, args), output.as_deref())
        }
        Commands::Predict(args) => {
            let store = build_store(&config, cohort)?;
            let prediction = run_predict(&store, &args)?;
            write_json(&prediction, output.as_deref())
        }
        Commands::Patients(_) => {
            let views = AggregateViews::new(&cohort, config.training.clone());
            write_json(&views.list_patients()?, output.as_deref())
        }
        Commands::TopRisk(args) => {
            let views = AggregateViews::new(&cohort, config.training.clone());
            write_json(&views.top_severity(args.n)?, output.as_deref())
        }
        Commands::Stats(_) => {
            let views = AggregateViews::new(&cohort, config.training.clone());
            write_json(&views.level_stats()?, output.as_deref())
        }
        Commands::Counts(_) => {
            let views = AggregateViews::new(&cohort, config.training.clone());
            write_json(&views.counts_by_type()?, output.as_deref())
        }
        Commands::CancerTypes(_) => {
            let views = AggregateViews::new(&cohort, config.training.clone());
            write_json(&views.available_cancer_types(), output.as_deref())
        }
    }
}

/// Config file (or defaults) with command-line overrides applied
fn load_config(cli: &Cli) -> Result<StrataConfig> {
    let mut config = match &cli.config {
        Some(path) => StrataConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => StrataConfig::default(),
    };

    if let Some(data) = &cli.data {
        config.data_path = data.clone();
    }
    if let Some(models_dir) = &cli.models_dir {
        config.models_dir = models_dir.clone();
    }
    Ok(config)
}

/// Construct the model store; models otherwise load lazily on first use
fn build_store(config: &StrataConfig, cohort: strata::Cohort) -> Result<ModelStore> {
    let artifacts = ArtifactStore::new(&config.models_dir)
        .with_context(|| format!("Failed to open models directory {:?}", config.models_dir))?;
    let store = ModelStore::new(Arc::new(cohort), artifacts, config.training.clone());

    if config.auto_train {
        info!("Auto-training every available cancer type...");
        let report = store.train_all(None, false);
        info!(
            "Auto-training finished in {}",
            format_duration(report.duration_secs)
        );
    } else if config.preload_models {
        info!("Preloaded {} saved models", store.load_all());
    }
    Ok(store)
}

fn run_train(store: &ModelStore, args: TrainArgs) -> strata::TrainAllReport {
    info!("Starting training...");
    info!("Models directory: {:?}", store.artifacts().models_dir());

    let subset = (!args.cancer_types.is_empty()).then_some(args.cancer_types);
    let report = store.train_all(subset.as_deref(), args.force);

    info!("\n=== Training Results ===");
    info!("Trained: {}", report.trained.len());
    for skipped in &report.skipped {
        info!("  skipped '{}': {}", skipped.cancer_type, skipped.reason);
    }
    info!("Training time: {}", format_duration(report.duration_secs));
    report
}

fn run_predict(store: &ModelStore, args: &PredictArgs) -> Result<strata::SeverityPrediction> {
    let raw = if args.reads_stdin() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read features from stdin")?;
        buf
    } else {
        std::fs::read_to_string(&args.input)
            .with_context(|| format!("Failed to read features from {:?}", args.input))?
    };

    let value: serde_json::Value =
        serde_json::from_str(&raw).context("Feature input is not valid JSON")?;

    let cancer_type = args
        .cancer_type
        .clone()
        .or_else(|| {
            value
                .get(CANCER_TYPE_KEY)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_CANCER_TYPE.to_string());

    let features = FeatureInput::from_json(&value).context("Invalid feature input")?;

    info!("Predicting severity for '{}'", cancer_type);
    predict_severity(store, &features, &cancer_type)
        .with_context(|| format!("Prediction failed for '{}'", cancer_type))
}

/// Pretty JSON to the given file, or stdout
fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write output to {:?}", path))?;
            info!("Output saved to: {:?}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}
