//! hiforecast CLI for training, forecasting and evaluation.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use hiforecast_core::TSForecastingModel;
use hiforecast_data::{read_npy, temporal_split, write_forecast_npy, MultivariatePanel, TemporalSplitConfig};
use hiforecast_models::{
    default_registry, load_checkpoint, save_checkpoint, Architecture, CheckpointMetadata,
    ModelConfig, ScalerType,
};
use hiforecast_train::{evaluate, predict, FitOutput, ForecastTrainer, ForecastTrainerConfig, PointLoss};

/// Backend type for training.
type TrainBackend = Autodiff<NdArray>;
/// Backend type for inference.
type InferBackend = NdArray;

#[derive(Parser)]
#[command(name = "hiforecast")]
#[command(author, version)]
#[command(about = "Multivariate forecasting with HiTransformer, HSOFTS and SOFTS")]
#[command(long_about = "hiforecast: hierarchical multivariate time series forecasting.

Panels are read from .npy files of shape (series, time) or, with the
polars-io feature, long-format CSV files with unique_id, ds and y columns.

EXAMPLES:
  # Train SOFTS on a panel, holding out the last 96 steps for testing
  hiforecast train --data traffic.npy --arch SOFTS --horizon 24 --input-size 96 \\
      --val-size 96 --test-size 96 --output runs/softs

  # Train from a run file, overriding the number of steps
  hiforecast train --data traffic.npy --config run.json --max-steps 200

  # Forecast the next horizon after the end of the panel
  hiforecast predict --checkpoint runs/softs --data traffic.npy --output forecast.npy

  # Metrics over the last 96 steps
  hiforecast evaluate --checkpoint runs/softs --data traffic.npy --test-size 96

  # Inspect an architecture
  hiforecast models inspect HSOFTS --horizon 24 --input-size 96 --n-series 7")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model and write a checkpoint
    Train(TrainArgs),
    /// Forecast the steps after the end of a panel
    Predict {
        /// Checkpoint directory written by `train`
        #[arg(long, value_name = "DIR")]
        checkpoint: PathBuf,

        /// Panel to forecast
        #[arg(long, value_name = "PATH")]
        data: PathBuf,

        /// Write the (1, series, horizon) forecast as .npy instead of printing JSON
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Compute forecast metrics with a trained model
    Evaluate {
        /// Checkpoint directory written by `train`
        #[arg(long, value_name = "DIR")]
        checkpoint: PathBuf,

        /// Panel to evaluate on
        #[arg(long, value_name = "PATH")]
        data: PathBuf,

        /// Only evaluate windows whose targets fall in the last N steps
        #[arg(long, value_name = "N")]
        test_size: Option<usize>,

        /// Windows per batch
        #[arg(long, default_value = "32", value_name = "SIZE")]
        batch_size: usize,

        /// Write the metrics as JSON
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// List and inspect architectures
    Models {
        #[command(subcommand)]
        command: ModelCommands,
    },
}

#[derive(Subcommand)]
enum ModelCommands {
    /// List available architectures
    List,
    /// Show the full default config and parameter count of an architecture
    Inspect {
        /// Architecture name
        arch: Architecture,

        /// Forecast horizon
        #[arg(long, default_value = "24", value_name = "H")]
        horizon: usize,

        /// Look-back length
        #[arg(long, default_value = "96", value_name = "L")]
        input_size: usize,

        /// Number of series
        #[arg(long, default_value = "7", value_name = "N")]
        n_series: usize,
    },
}

#[derive(clap::Args)]
struct TrainArgs {
    /// Panel to train on
    #[arg(long, value_name = "PATH")]
    data: PathBuf,

    /// JSON run file with `model`, `trainer` and `split` sections
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Architecture: HiTransformer, HSOFTS, SOFTS
    #[arg(long, value_name = "MODEL")]
    arch: Option<Architecture>,

    /// Forecast horizon
    #[arg(long, value_name = "H")]
    horizon: Option<usize>,

    /// Look-back length
    #[arg(long, value_name = "L")]
    input_size: Option<usize>,

    /// Number of optimizer steps
    #[arg(long, value_name = "N")]
    max_steps: Option<usize>,

    /// Learning rate for Adam
    #[arg(long, value_name = "LR")]
    lr: Option<f64>,

    /// Windows per batch
    #[arg(long, value_name = "SIZE")]
    batch_size: Option<usize>,

    /// Scaler: identity, standard, robust, minmax, minmax1, invariant
    #[arg(long, value_name = "SCALER")]
    scaler: Option<ScalerType>,

    /// Loss: mae, mse, rmse, mape, smape, huber
    #[arg(long, value_name = "LOSS")]
    loss: Option<PointLoss>,

    /// Validation checks without improvement before stopping
    #[arg(long, value_name = "N")]
    early_stop: Option<i64>,

    /// Steps between validation checks
    #[arg(long, value_name = "N")]
    val_check_steps: Option<usize>,

    /// Steps held out for validation
    #[arg(long, value_name = "N")]
    val_size: Option<usize>,

    /// Steps held out for testing
    #[arg(long, value_name = "N")]
    test_size: Option<usize>,

    /// Random seed for reproducibility
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Output directory for the checkpoint and training history
    #[arg(long, default_value = "./runs/hiforecast", value_name = "DIR")]
    output: PathBuf,
}

/// Contents of a `--config` run file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RunFile {
    model: Option<Value>,
    trainer: ForecastTrainerConfig,
    split: TemporalSplitConfig,
}

impl RunFile {
    fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run file {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid run file {}", path.display()))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Train(args) => handle_train(args),
        Commands::Predict {
            checkpoint,
            data,
            output,
        } => handle_predict(&checkpoint, &data, output.as_deref()),
        Commands::Evaluate {
            checkpoint,
            data,
            test_size,
            batch_size,
            output,
        } => handle_evaluate(&checkpoint, &data, test_size, batch_size, output.as_deref()),
        Commands::Models { command } => handle_models(command),
    }
}

/// Read a panel from `.npy` or long-format `.csv`.
fn load_panel(path: &Path) -> Result<MultivariatePanel> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    let panel = match ext.as_str() {
        "npy" => read_npy(path),
        #[cfg(feature = "polars-io")]
        "csv" => hiforecast_data::read_long_csv(path),
        #[cfg(not(feature = "polars-io"))]
        "csv" => bail!("CSV input requires building with the 'polars-io' feature"),
        other => bail!("Unsupported data file extension '{}': expected .npy or .csv", other),
    };
    panel.with_context(|| format!("Failed to load panel {}", path.display()))
}

/// Merge the run file model section with command line overrides.
fn resolve_model_config(args: &TrainArgs, file_model: Option<Value>, n_series: usize) -> Result<ModelConfig> {
    let mut value = file_model.unwrap_or_else(|| Value::Object(Default::default()));
    let Some(object) = value.as_object_mut() else {
        bail!("The 'model' section of the run file must be an object");
    };
    if let Some(arch) = args.arch {
        object.insert("architecture".into(), Value::from(arch.name()));
    }
    if let Some(h) = args.horizon {
        object.insert("h".into(), Value::from(h));
    }
    if let Some(input_size) = args.input_size {
        object.insert("input_size".into(), Value::from(input_size));
    }
    object.insert("n_series".into(), Value::from(n_series));
    for (key, flag) in [("architecture", "--arch"), ("h", "--horizon"), ("input_size", "--input-size")] {
        if !object.contains_key(key) {
            bail!("Missing model setting '{}': pass {} or set it in the run file", key, flag);
        }
    }

    let config: ModelConfig = serde_json::from_value(value).context("Invalid model configuration")?;
    config.validate().context("Invalid model configuration")?;
    Ok(config)
}

fn handle_train(args: TrainArgs) -> Result<()> {
    let run = match &args.config {
        Some(path) => RunFile::load(path)?,
        None => RunFile::default(),
    };

    let panel = load_panel(&args.data)?;
    println!("=== hiforecast Training ===\n");
    println!("Data: {} ({} series, {} steps)", args.data.display(), panel.n_series(), panel.len());

    let model_config = resolve_model_config(&args, run.model, panel.n_series())?;

    let mut trainer_config = run.trainer;
    if let Some(v) = args.max_steps {
        trainer_config.max_steps = v;
    }
    if let Some(v) = args.lr {
        trainer_config.learning_rate = v;
    }
    if let Some(v) = args.batch_size {
        trainer_config.batch_size = v;
    }
    if let Some(v) = args.scaler {
        trainer_config.scaler_type = v;
    }
    if let Some(v) = args.loss {
        trainer_config.loss = v;
    }
    if let Some(v) = args.early_stop {
        trainer_config.early_stop_patience_steps = v;
    }
    if let Some(v) = args.val_check_steps {
        trainer_config.val_check_steps = v;
    }
    if let Some(v) = args.seed {
        trainer_config.random_seed = v;
    }

    let mut split_config = run.split;
    if let Some(v) = args.val_size {
        split_config.val_size = v;
    }
    if let Some(v) = args.test_size {
        split_config.test_size = v;
    }

    println!("\nConfiguration:");
    println!("  Architecture:  {}", model_config.architecture());
    println!("  Horizon:       {}", model_config.horizon());
    println!("  Input size:    {}", model_config.input_size());
    println!("  Max steps:     {}", trainer_config.max_steps);
    println!("  Learning rate: {}", trainer_config.learning_rate);
    println!("  Batch size:    {}", trainer_config.batch_size);
    println!("  Scaler:        {}", trainer_config.scaler_type);
    println!("  Loss:          {}", trainer_config.loss);
    println!("  Seed:          {}", trainer_config.random_seed);
    println!("  Output:        {}\n", args.output.display());

    let split = temporal_split(
        &panel,
        split_config,
        model_config.input_size(),
        model_config.horizon(),
    )
    .context("Failed to split the panel")?;

    let device = <TrainBackend as Backend>::Device::default();
    let trainer = ForecastTrainer::<TrainBackend>::new(trainer_config, device)
        .context("Invalid trainer configuration")?;
    trainer.seed_backend();

    let run = TrainRun {
        trainer: &trainer,
        model_config: &model_config,
        train: &split.train,
        valid: split.valid.as_ref(),
        test: split.test.as_ref(),
        output: &args.output,
    };
    match &model_config {
        ModelConfig::HiTransformer(c) => run.execute(c.init::<TrainBackend>(&device)?),
        ModelConfig::HSOFTS(c) => run.execute(c.init::<TrainBackend>(&device)?),
        ModelConfig::SOFTS(c) => run.execute(c.init::<TrainBackend>(&device)?),
    }
}

/// Everything a training run needs besides the model itself.
struct TrainRun<'a> {
    trainer: &'a ForecastTrainer<TrainBackend>,
    model_config: &'a ModelConfig,
    train: &'a MultivariatePanel,
    valid: Option<&'a MultivariatePanel>,
    test: Option<&'a MultivariatePanel>,
    output: &'a Path,
}

impl TrainRun<'_> {
    fn execute<M>(&self, model: M) -> Result<()>
    where
        M: AutodiffModule<TrainBackend> + TSForecastingModel<TrainBackend>,
        M::InnerModule: TSForecastingModel<InferBackend>,
    {
        println!("Model: {} ({} parameters)", model.name(), model.num_params());
        println!("Starting training...\n");

        let result: FitOutput<M> = self
            .trainer
            .fit(model, self.train, self.valid)
            .context("Training failed")?;

        println!("\nTraining complete!");
        println!("  Steps:         {}", result.steps);
        if let (Some(loss), Some(step)) = (result.best_valid_loss, result.best_step) {
            println!("  Best val loss: {:.6} (step {})", loss, step);
        }
        if result.stopped_early {
            println!("  Stopped early");
        }
        println!("  Training time: {:.1}s", result.training_time_secs);

        let config = self.trainer.config();
        let model = result.model.valid();
        let mut metadata = CheckpointMetadata::for_config(self.model_config)?
            .with_step(result.best_step.unwrap_or(result.steps))
            .with_scaler(config.scaler_type)
            .with_extra("loss", config.loss.name())
            .with_extra("random_seed", config.random_seed.to_string());
        if let Some(loss) = result.best_valid_loss {
            metadata = metadata.with_val_loss(loss);
        }
        save_checkpoint::<InferBackend, _>(&model, &metadata, self.output)
            .context("Failed to save checkpoint")?;
        println!("\nSaved checkpoint to {}", self.output.display());

        let history_path = self.output.join("history.json");
        let history = serde_json::json!({
            "train_losses": result.train_losses,
            "valid_losses": result.valid_losses,
            "best_valid_loss": result.best_valid_loss,
            "best_step": result.best_step,
            "steps": result.steps,
            "stopped_early": result.stopped_early,
            "training_time_secs": result.training_time_secs,
        });
        std::fs::write(&history_path, serde_json::to_string_pretty(&history)?)?;
        println!("Saved history to {}", history_path.display());

        if let Some(test) = self.test {
            let device = <InferBackend as Backend>::Device::default();
            let batch_size = config.valid_batch_size.unwrap_or(config.batch_size);
            let evaluation = evaluate::<InferBackend, _>(&model, test, config.scaler_type, batch_size, &device)
                .context("Test evaluation failed")?;
            println!("\nTest metrics ({} windows):", evaluation.n_windows);
            print_metrics(&evaluation.metrics);

            let metrics_path = self.output.join("metrics.json");
            std::fs::write(&metrics_path, serde_json::to_string_pretty(&evaluation)?)?;
            println!("Saved metrics to {}", metrics_path.display());
        }

        println!("\n=== Training finished successfully! ===");
        Ok(())
    }
}

fn print_metrics(metrics: &hiforecast_train::ForecastMetrics) {
    for (name, value) in metrics.as_pairs() {
        println!("  {:<6} {:.6}", name, value);
    }
}

/// Load the checkpoint in `dir` and hand the rebuilt model to `f`.
macro_rules! with_checkpoint {
    ($dir:expr, $device:expr, |$meta:ident, $model:ident| $body:expr) => {{
        let dir: &Path = $dir;
        let stored = CheckpointMetadata::load(dir.join(hiforecast_models::checkpoint::METADATA_FILE))
            .with_context(|| format!("No checkpoint metadata in {}", dir.display()))?;
        let config = stored.model_config()?;
        info!(arch = %config.architecture(), path = %dir.display(), "loading checkpoint");
        match config {
            ModelConfig::HiTransformer(c) => {
                let ($meta, $model) = load_checkpoint::<InferBackend, _>(dir, $device, |_, d| Ok(c.init::<InferBackend>(d)?))?;
                $body
            }
            ModelConfig::HSOFTS(c) => {
                let ($meta, $model) = load_checkpoint::<InferBackend, _>(dir, $device, |_, d| Ok(c.init::<InferBackend>(d)?))?;
                $body
            }
            ModelConfig::SOFTS(c) => {
                let ($meta, $model) = load_checkpoint::<InferBackend, _>(dir, $device, |_, d| Ok(c.init::<InferBackend>(d)?))?;
                $body
            }
        }
    }};
}

fn handle_predict(checkpoint: &Path, data: &Path, output: Option<&Path>) -> Result<()> {
    let panel = load_panel(data)?;
    let device = <InferBackend as Backend>::Device::default();

    with_checkpoint!(checkpoint, &device, |meta, model| {
        run_predict(&model, &meta, &panel, &device, output)
    })
}

fn run_predict<M: TSForecastingModel<InferBackend>>(
    model: &M,
    meta: &CheckpointMetadata,
    panel: &MultivariatePanel,
    device: &<InferBackend as Backend>::Device,
    output: Option<&Path>,
) -> Result<()> {
    let scaler = meta.scaler.unwrap_or_default();
    let forecast = predict::<InferBackend, _>(model, panel, scaler, device).context("Forecast failed")?;

    match output {
        Some(path) => {
            write_forecast_npy(path, &forecast.clone().insert_axis(ndarray::Axis(0)))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "Wrote {} x {} forecast to {}",
                forecast.nrows(),
                forecast.ncols(),
                path.display()
            );
        }
        None => {
            let series: Vec<Value> = panel
                .ids()
                .iter()
                .zip(forecast.outer_iter())
                .map(|(id, row)| serde_json::json!({ "unique_id": id, "forecast": row.to_vec() }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&series)?);
        }
    }
    Ok(())
}

fn handle_evaluate(
    checkpoint: &Path,
    data: &Path,
    test_size: Option<usize>,
    batch_size: usize,
    output: Option<&Path>,
) -> Result<()> {
    let panel = load_panel(data)?;
    let device = <InferBackend as Backend>::Device::default();

    with_checkpoint!(checkpoint, &device, |meta, model| {
        let panel = match test_size {
            Some(n) => {
                let needed = n + model.input_size();
                if needed > panel.len() {
                    bail!(
                        "Panel has {} steps, evaluating the last {} needs {}",
                        panel.len(),
                        n,
                        needed
                    );
                }
                panel.slice_time(panel.len() - needed, panel.len())?
            }
            None => panel,
        };
        let scaler = meta.scaler.unwrap_or_default();
        let evaluation = evaluate::<InferBackend, _>(&model, &panel, scaler, batch_size, &device)
            .context("Evaluation failed")?;

        println!("{} on {} windows:", meta.arch, evaluation.n_windows);
        print_metrics(&evaluation.metrics);
        if let Some(path) = output {
            std::fs::write(path, serde_json::to_string_pretty(&evaluation)?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Saved metrics to {}", path.display());
        }
        Ok(())
    })
}

fn handle_models(command: ModelCommands) -> Result<()> {
    match command {
        ModelCommands::List => {
            println!("Available architectures:\n");
            for arch in Architecture::ALL {
                let summary = match arch {
                    Architecture::HiTransformer => "inverted Transformer with optional diff / EWMA token embeddings",
                    Architecture::HSOFTS => "STAD encoder with parallel projectors and per-segment heads",
                    Architecture::SOFTS => "one STAD encoder and projection per horizon segment",
                };
                println!("  {:<14} {}", arch.name(), summary);
            }
            println!("\nUsage:");
            println!("  hiforecast models inspect ARCH --horizon H --input-size L --n-series N");
            Ok(())
        }
        ModelCommands::Inspect {
            arch,
            horizon,
            input_size,
            n_series,
        } => {
            let value = serde_json::json!({
                "architecture": arch.name(),
                "h": horizon,
                "input_size": input_size,
                "n_series": n_series,
            });
            let config: ModelConfig = serde_json::from_value(value.clone())?;

            let device = <InferBackend as Backend>::Device::default();
            let model = default_registry::<InferBackend>()
                .create(arch.name(), &value, &device)
                .with_context(|| format!("Failed to build {}", arch))?;

            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("\nParameters: {}", model.num_params());
            Ok(())
        }
    }
}
