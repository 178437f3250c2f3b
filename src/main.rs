//! Feed-forward network CLI
//!
//! Trains a model from CSV samples and saves it, or loads a saved model and reports
//! how far its predictions deviate from known targets.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use feedforward::{
    Activation, BackendKind, FitConfig, LossFunction, Model, ModelBuilder, OptimizerKind,
    Samples, Shuffle, deviation_report,
};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "feedforward")]
#[command(about = "Train and evaluate feed-forward neural networks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum LossArg {
    Mse,
    Mae,
}

#[derive(Clone, Copy, ValueEnum)]
enum OptimizerArg {
    Sgd,
    Rmsprop,
    Adam,
    Adagrad,
    Adadelta,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model and save it
    Train {
        /// Input samples (CSV with a header row)
        #[arg(long)]
        inputs: PathBuf,

        /// Target samples (CSV with a header row)
        #[arg(long)]
        targets: PathBuf,

        /// Neurons per layer after the input layer, e.g. 64,64,9,3
        #[arg(long, value_delimiter = ',', required = true)]
        layers: Vec<usize>,

        /// Activation descriptor used by every layer
        #[arg(long, default_value = "TanH, alpha = 0.01")]
        activation: Activation,

        #[arg(long, value_enum, default_value = "mse")]
        loss: LossArg,

        /// L2 regularization strength
        #[arg(long, default_value = "0.0")]
        lambda: f64,

        #[arg(long, value_enum, default_value = "rmsprop")]
        optimizer: OptimizerArg,

        /// Learning rate (ignored by adadelta)
        #[arg(long, default_value = "0.005")]
        lr: f64,

        #[arg(long, default_value = "100")]
        epochs: usize,

        #[arg(long, default_value = "1")]
        batch_size: usize,

        /// Seed for weight initialization and batch shuffling
        #[arg(long)]
        seed: Option<u64>,

        /// Matrix multiplication backend (sequential, accelerated)
        #[arg(long, default_value = "sequential")]
        backend: BackendKind,

        /// Base path of the saved model
        #[arg(long)]
        out: PathBuf,
    },

    /// Load a saved model and report prediction deviation
    Predict {
        /// Base path of the saved model
        #[arg(long)]
        model: PathBuf,

        #[arg(long)]
        inputs: PathBuf,

        #[arg(long)]
        targets: PathBuf,

        #[arg(long, default_value = "sequential")]
        backend: BackendKind,
    },
}

fn optimizer_kind(arg: OptimizerArg, lr: f64) -> OptimizerKind {
    match arg {
        OptimizerArg::Sgd => OptimizerKind::GradientDescent { lr },
        OptimizerArg::Rmsprop => OptimizerKind::RmsProp { lr },
        OptimizerArg::Adam => OptimizerKind::Adam { lr },
        OptimizerArg::Adagrad => OptimizerKind::Adagrad { lr },
        OptimizerArg::Adadelta => OptimizerKind::Adadelta,
    }
}

fn load_vectors(path: &Path) -> Result<(Vec<feedforward::Matrix>, usize)> {
    let samples =
        Samples::load_csv(path).with_context(|| format!("loading {}", path.display()))?;
    info!(
        path = %path.display(),
        samples = samples.len(),
        columns = samples.columns(),
        "loaded samples"
    );
    Ok((samples.to_vectors()?, samples.columns()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Train {
            inputs,
            targets,
            layers,
            activation,
            loss,
            lambda,
            optimizer,
            lr,
            epochs,
            batch_size,
            seed,
            backend,
            out,
        } => {
            let (xs, input_width) = load_vectors(&inputs)?;
            let (ys, target_width) = load_vectors(&targets)?;
            if xs.len() != ys.len() {
                bail!("{} input samples but {} target samples", xs.len(), ys.len());
            }
            if layers.last() != Some(&target_width) {
                bail!(
                    "last layer has {:?} neurons but targets have {target_width} columns",
                    layers.last()
                );
            }

            let loss = match loss {
                LossArg::Mse => LossFunction::mse(lambda)?,
                LossArg::Mae => LossFunction::mae(lambda)?,
            };
            let mut builder = ModelBuilder::new(input_width)?
                .input_activation(activation)?
                .loss(loss)
                .optimizer(optimizer_kind(optimizer, lr))?
                .backend(backend)?;
            for &neurons in &layers {
                builder = builder.add_layer(neurons, activation)?;
            }
            let mut model = match seed {
                Some(seed) => builder.build_with_seed(seed)?,
                None => builder.build()?,
            };

            let cfg = FitConfig {
                epochs,
                batch_size,
                shuffle: seed.map_or(Shuffle::Random, Shuffle::Seeded),
            };
            let report = model.fit(&xs, &ys, cfg)?;
            if let (Some(first), Some(last)) = (report.first_loss(), report.final_loss()) {
                println!("Loss: {first:.6} (epoch 1) -> {last:.6} (epoch {epochs})");
            }

            model
                .save(&out)
                .with_context(|| format!("saving model to {}", out.display()))?;
            println!("Model saved to {}", out.display());
        }

        Commands::Predict {
            model,
            inputs,
            targets,
            backend,
        } => {
            let mut loaded = Model::load(&model)
                .with_context(|| format!("loading model {}", model.display()))?;
            loaded.attach_backend(backend)?;
            info!(layers = loaded.network().len(), "model loaded");

            let (xs, _) = load_vectors(&inputs)?;
            let (ys, _) = load_vectors(&targets)?;
            let report = deviation_report(&loaded, &xs, &ys)?;

            for (i, d) in report.per_sample.iter().enumerate() {
                println!("@ [{}] -> Deviation (%) : {:.4}", i + 1, d * 100.0);
            }
            println!("{:-<60}", "");
            println!("Avg accuracy  : {:.4} %", report.accuracy() * 100.0);
            println!(
                "Min deviation : {:.4} % @ position {}",
                report.min.1 * 100.0,
                report.min.0 + 1
            );
            println!(
                "Max deviation : {:.4} % @ position {}",
                report.max.1 * 100.0,
                report.max.0 + 1
            );
        }
    }

    Ok(())
}
