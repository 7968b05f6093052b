mod config;
mod pipeline;

use std::path::PathBuf;

use burn::backend::Autodiff;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::TrainOverrides;
use pipeline::{DataSource, TrainArgs};

#[cfg(not(feature = "wgpu"))]
type TrainBackend = Autodiff<burn::backend::NdArray<f32>>;
#[cfg(feature = "wgpu")]
type TrainBackend = Autodiff<burn::backend::Wgpu>;

/// pretrain-cli: dual-loss (masked reconstruction + InfoNCE) pretraining.
#[derive(Parser)]
#[command(name = "pretrain-cli", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Pretrain the masked-contrastive model.
    Train {
        /// Path to pretraining config TOML file.
        #[arg(long, default_value = "configs/pretrain.toml")]
        config: PathBuf,
        /// Training features as JSONL (`{"features": [...]}` per line).
        #[arg(long, requires = "val_data", conflicts_with = "synthetic")]
        train_data: Option<PathBuf>,
        /// Validation features as JSONL.
        #[arg(long, requires = "train_data")]
        val_data: Option<PathBuf>,
        /// Train on this many synthetic samples instead of files.
        #[arg(long, required_unless_present = "train_data")]
        synthetic: Option<usize>,
        /// Feature dimension of synthetic samples.
        #[arg(long, default_value_t = 32)]
        dim: usize,
        /// Seed for synthetic samples.
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Override the number of epochs.
        #[arg(long)]
        epochs: Option<usize>,
        /// Override the peak learning rate.
        #[arg(long)]
        lr: Option<f64>,
        /// Override the training batch size.
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            config,
            train_data,
            val_data,
            synthetic,
            dim,
            seed,
            epochs,
            lr,
            batch_size,
        } => {
            let data = match (train_data, val_data, synthetic) {
                (Some(train), Some(val), _) => DataSource::Files { train, val },
                (_, _, Some(n)) => DataSource::Synthetic { n, dim, seed },
                _ => anyhow::bail!("pass --train-data and --val-data, or --synthetic N"),
            };
            let args = TrainArgs {
                config,
                data,
                overrides: TrainOverrides {
                    n_epochs: epochs,
                    lr,
                    batch_size,
                },
            };

            let device = Default::default();
            tracing::info!(backend = std::any::type_name::<TrainBackend>(), "Selected backend");
            let report = pipeline::run_train::<TrainBackend>(args, device)?;
            pipeline::print_report(&report);
            Ok(())
        }
    }
}
