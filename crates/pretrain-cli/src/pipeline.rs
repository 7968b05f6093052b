//! Pretraining pipeline: resolve config and data, build the model, train.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use burn::data::dataset::{Dataset, InMemDataset};
use burn::tensor::backend::AutodiffBackend;

use pretrain::training::data::{load_jsonl, synthetic_dataset};
use pretrain::{FeatureSample, TrainingHistory, Trainer};

use crate::config::{build_pretrain_config, TrainOverrides};

/// Where the training and validation samples come from.
#[derive(Debug, Clone)]
pub enum DataSource {
    /// JSONL feature files.
    Files { train: PathBuf, val: PathBuf },
    /// Seeded synthetic clusters; validation gets a fifth as many samples.
    Synthetic { n: usize, dim: usize, seed: u64 },
}

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    /// Path to the pretraining config TOML file.
    pub config: PathBuf,
    /// Training and validation data.
    pub data: DataSource,
    /// CLI overrides for the `[train]` section.
    pub overrides: TrainOverrides,
}

/// Final numbers from a completed run.
#[derive(Debug)]
pub struct TrainReport {
    pub epochs: usize,
    pub train_samples: usize,
    pub val_samples: usize,
    pub d_input: usize,
    pub history: TrainingHistory,
    pub elapsed_secs: f64,
}

type Datasets = (InMemDataset<FeatureSample>, InMemDataset<FeatureSample>, usize);

/// Load or generate both splits and return them with their feature dimension.
fn load_data(source: &DataSource) -> anyhow::Result<Datasets> {
    match source {
        DataSource::Files { train, val } => {
            let train_ds = load_jsonl(train).context("loading training data")?;
            let val_ds = load_jsonl(val).context("loading validation data")?;
            let dim = feature_dim(&train_ds)?;
            let val_dim = feature_dim(&val_ds)?;
            if dim != val_dim {
                anyhow::bail!(
                    "training features have dimension {dim} but validation features have {val_dim}"
                );
            }
            Ok((train_ds, val_ds, dim))
        }
        DataSource::Synthetic { n, dim, seed } => {
            if *n == 0 || *dim == 0 {
                anyhow::bail!("--synthetic and --dim must be > 0");
            }
            let n_val = (n / 5).max(1);
            tracing::info!(n, n_val, dim, seed, "Generating synthetic features");
            Ok((
                synthetic_dataset(*n, *dim, *seed),
                synthetic_dataset(n_val, *dim, seed.wrapping_add(1)),
                *dim,
            ))
        }
    }
}

fn feature_dim(dataset: &InMemDataset<FeatureSample>) -> anyhow::Result<usize> {
    dataset
        .get(0)
        .map(|s| s.features.len())
        .ok_or_else(|| anyhow::anyhow!("dataset is empty"))
}

/// Run a full pretraining job on backend `B`.
pub fn run_train<B: AutodiffBackend>(
    args: TrainArgs,
    device: B::Device,
) -> anyhow::Result<TrainReport> {
    let start = Instant::now();

    let config = build_pretrain_config(&args.config, &args.overrides)?;
    let (train_ds, val_ds, d_input) = load_data(&args.data)?;
    let train_samples = train_ds.len();
    let val_samples = val_ds.len();

    let model_config = config.model.to_model_config(d_input);
    tracing::info!(
        d_input,
        d_hidden = model_config.d_hidden,
        d_proj = model_config.d_proj,
        mask_ratio = model_config.mask_ratio,
        "Initializing masked-contrastive model"
    );
    let model = model_config.init::<B>(&device);

    let trainer = Trainer::new(train_ds, val_ds, model, &config, device)?;
    let outcome = trainer.train()?;

    Ok(TrainReport {
        epochs: config.train.n_epochs,
        train_samples,
        val_samples,
        d_input,
        history: outcome.history,
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}

/// Print a human-readable summary of a finished run.
pub fn print_report(report: &TrainReport) {
    println!("\n--- Pretraining Summary ---");
    println!("Epochs: {}", report.epochs);
    println!(
        "Samples: {} train / {} validation (dim {})",
        report.train_samples, report.val_samples, report.d_input
    );
    if let Some(last) = report.history.last_epoch() {
        println!(
            "Final train loss: {:.4} (MIM {:.4}, NCE {:.4})",
            last.train_total_loss, last.train_mim_loss, last.train_nce_loss
        );
        println!("Final validation loss: {:.4}", last.val_loss);
    }
    if let Some(best) = report
        .history
        .epochs
        .iter()
        .min_by(|a, b| a.val_loss.total_cmp(&b.val_loss))
    {
        println!("Best validation loss: {:.4} (epoch {})", best.val_loss, best.epoch);
    }
    println!("Elapsed: {:.1}s", report.elapsed_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    const SMALL_CONFIG: &str = r#"
[train]
batch_size = 4
n_epochs = 3
lr = 1e-3
lr_sched = "cosine"

[model]
d_hidden = 8
d_proj = 4
"#;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(contents.as_bytes())
            .unwrap();
        path
    }

    #[test]
    fn test_synthetic_run() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = write_file(tmp.path(), "pretrain.toml", SMALL_CONFIG);

        let args = TrainArgs {
            config,
            data: DataSource::Synthetic { n: 20, dim: 6, seed: 9 },
            overrides: TrainOverrides {
                n_epochs: Some(2),
                ..Default::default()
            },
        };
        let report = run_train::<TestAutodiffBackend>(args, Default::default()).unwrap();

        assert_eq!(report.epochs, 2);
        assert_eq!(report.train_samples, 20);
        assert_eq!(report.val_samples, 4);
        assert_eq!(report.d_input, 6);
        assert_eq!(report.history.epochs.len(), 2);
    }

    #[test]
    fn test_jsonl_run() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = write_file(tmp.path(), "pretrain.toml", SMALL_CONFIG);
        let row = |i: usize| format!("{{\"features\": [{i}.0, 1.0, -1.0, 0.5]}}\n");
        let train: String = (0..8).map(row).collect();
        let val: String = (0..3).map(row).collect();
        let train = write_file(tmp.path(), "train.jsonl", &train);
        let val = write_file(tmp.path(), "val.jsonl", &val);

        let args = TrainArgs {
            config,
            data: DataSource::Files { train, val },
            overrides: TrainOverrides::default(),
        };
        let report = run_train::<TestAutodiffBackend>(args, Default::default()).unwrap();
        assert_eq!(report.d_input, 4);
        assert_eq!(report.history.epochs.len(), 3);
    }

    #[test]
    fn test_dimension_mismatch_between_splits() {
        let tmp = tempfile::TempDir::new().unwrap();
        let train = write_file(tmp.path(), "train.jsonl", "{\"features\": [1.0, 2.0]}\n");
        let val = write_file(tmp.path(), "val.jsonl", "{\"features\": [1.0, 2.0, 3.0]}\n");

        let err = load_data(&DataSource::Files { train, val }).err().unwrap();
        assert!(err.to_string().contains("dimension 2"), "{err}");
    }

    #[test]
    fn test_synthetic_zero_samples_rejected() {
        let err = load_data(&DataSource::Synthetic { n: 0, dim: 4, seed: 0 }).err().unwrap();
        assert!(err.to_string().contains("--synthetic"), "{err}");
    }
}
