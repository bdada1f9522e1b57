use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use dspd_predictor::analysis::{load_classifier, Classifier};
use dspd_predictor::api::{self, ApiState};
use dspd_predictor::cli::{self, Cli, Commands};
use dspd_predictor::config::{ModelConfig, ModelSourceConfig, ServiceConfig};
use dspd_predictor::metrics;
use dspd_predictor::ml::InferenceAdapter;
use dspd_predictor::preprocess::{sanitize, AlphabetPolicy, NpzWriter, SequenceEncoder, NUCLEOTIDES};
use dspd_predictor::processing::PredictionPipeline;
use dspd_predictor::storage::load_model_bytes;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    if let Err(e) = run_command(cli.command, cli.config.as_deref()).await {
        error!("Error: {:?}", e);
        std::process::exit(1);
    }
}

async fn run_command(command: Commands, config_path: Option<&Path>) -> Result<()> {
    let config = ServiceConfig::load(config_path)?;
    match command {
        Commands::Serve(args) => cmd_serve(args, config).await,
        Commands::Predict(args) => cmd_predict(args, config).await,
        Commands::ExportNpz(args) => cmd_export_npz(args, config),
    }
}

fn local_model(path: PathBuf) -> ModelSourceConfig {
    ModelSourceConfig::Local { paths: vec![path] }
}

/// Fetch and load the configured classifier. Without `require_model`, any
/// failure is logged and the stand-in takes over.
async fn build_adapter(
    model: &ModelConfig,
    encoder: &SequenceEncoder,
    require_model: bool,
) -> Result<InferenceAdapter> {
    let loaded = match load_model_bytes(model).await {
        Ok(Some(bytes)) => load_classifier(model.backend, &bytes, model.activation).map(Some),
        Ok(None) => Ok(None),
        Err(e) => Err(e),
    };

    let adapter = match loaded {
        Ok(Some(classifier)) => {
            info!("Model loaded ({} backend)", classifier.name());
            InferenceAdapter::with_classifier(classifier)
        }
        Ok(None) => {
            if require_model {
                anyhow::bail!("no model source configured and --require-model is set");
            }
            warn!("No model source configured, serving stand-in predictions");
            InferenceAdapter::stand_in()
        }
        Err(e) if require_model => return Err(e.context("Failed to load model")),
        Err(e) => {
            warn!("Model not loaded, serving stand-in predictions: {:#}", e);
            InferenceAdapter::stand_in()
        }
    };

    if let Some(width) = adapter.input_width() {
        if encoder.policy() == AlphabetPolicy::Fixed && width != encoder.max_length() * NUCLEOTIDES.len() {
            warn!(
                "Model expects {} inputs but sequences encode to {}; text uploads will fall back to stand-in predictions",
                width,
                encoder.max_length() * NUCLEOTIDES.len()
            );
        }
    }

    metrics::MODEL_LOADED.set(i64::from(adapter.is_model_loaded()));
    Ok(adapter)
}

async fn cmd_serve(args: cli::ServeArgs, mut config: ServiceConfig) -> Result<()> {
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(model) = args.model {
        config.model.source = local_model(model);
    }
    if let Some(max_length) = args.max_length {
        config.max_length = max_length;
    }
    if let Some(alphabet) = args.alphabet {
        config.alphabet = alphabet;
    }
    config.validate()?;
    metrics::register_metrics();

    info!("Starting DSPD prediction service");
    let encoder = SequenceEncoder::new(config.max_length, config.alphabet);
    let adapter = build_adapter(&config.model, &encoder, args.require_model).await?;
    let pipeline = PredictionPipeline::from_config(&config, adapter);

    let state = ApiState::new(
        pipeline,
        config.model.source.describe(),
        &config.array_extensions,
        config.max_upload_bytes,
    );
    api::serve(config.bind, state).await
}

async fn cmd_predict(args: cli::PredictArgs, mut config: ServiceConfig) -> Result<()> {
    let require_model = args.model.is_some();
    if let Some(model) = args.model {
        config.model.source = local_model(model);
    }
    config.validate()?;

    let content = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let filename = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let encoder = SequenceEncoder::new(config.max_length, config.alphabet);
    let adapter = build_adapter(&config.model, &encoder, require_model).await?;
    let pipeline = PredictionPipeline::from_config(&config, adapter);

    let response = pipeline.run(&filename, &content)?;
    let json = if args.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{}", json);

    Ok(())
}

fn cmd_export_npz(args: cli::ExportArgs, config: ServiceConfig) -> Result<()> {
    let max_length = args.max_length.unwrap_or(config.max_length);
    let alphabet = args.alphabet.unwrap_or(config.alphabet);
    if max_length == 0 {
        anyhow::bail!("max_length must be greater than zero");
    }

    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let seq = sanitize(&text)?;
    let encoder = SequenceEncoder::new(max_length, alphabet);
    let tensor = encoder.encode(&seq).flatten();

    let mut writer = NpzWriter::new();
    writer.add("data", &tensor.shape(), tensor.values())?;
    std::fs::write(&args.output, writer.finish()?)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    info!(
        "Encoded {} nucleotides into {:?} at {}",
        seq.len(),
        tensor.shape(),
        args.output.display()
    );
    Ok(())
}
