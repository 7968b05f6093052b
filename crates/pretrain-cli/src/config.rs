//! Config resolution for the pretraining CLI.
//!
//! Loads `configs/pretrain.toml` through the library loader, then merges the
//! command-line overrides on top.

use std::path::Path;

use anyhow::Context;
use pretrain::{load_pretrain_toml, PretrainConfig, TrainConfig};

/// Training hyperparameters that can be overridden from the command line.
#[derive(Debug, Default, Clone)]
pub struct TrainOverrides {
    /// `--epochs`
    pub n_epochs: Option<usize>,
    /// `--lr`
    pub lr: Option<f64>,
    /// `--batch-size`
    pub batch_size: Option<usize>,
}

impl TrainOverrides {
    /// Write every set flag into `config`.
    pub fn apply(&self, config: &mut TrainConfig) {
        if let Some(n) = self.n_epochs {
            config.n_epochs = n;
        }
        if let Some(lr) = self.lr {
            config.lr = lr;
        }
        if let Some(bs) = self.batch_size {
            config.batch_size = bs;
        }
    }
}

/// Build the run config from the TOML file and CLI flags.
///
/// Priority chain: built-in defaults < TOML values < CLI flags.
pub fn build_pretrain_config(
    path: &Path,
    overrides: &TrainOverrides,
) -> anyhow::Result<PretrainConfig> {
    let mut config = load_pretrain_toml(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    overrides.apply(&mut config.train);
    config.train.validate()?;
    Ok(config)
}
