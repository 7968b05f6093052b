//! TOML config loading for pretraining runs.
//!
//! Deserializes `configs/pretrain.toml`, which has a `[train]` section with
//! the loop hyperparameters and an optional `[model]` section overriding the
//! reference model's defaults.

use std::path::Path;

use serde::Deserialize;

use crate::error::TrainError;
use crate::model::masked_contrastive::MaskedContrastiveConfig;
use crate::training::optim::OptimizerKind;
use crate::training::schedule::LrSchedulerKind;

/// Top-level structure matching `configs/pretrain.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PretrainConfig {
    /// Training loop hyperparameters.
    pub train: TrainConfig,
    /// Reference model overrides.
    #[serde(default)]
    pub model: ModelOverrides,
}

/// Training loop hyperparameters (the `[train]` section).
#[derive(Debug, Clone, Deserialize)]
pub struct TrainConfig {
    /// Samples per training batch. Validation batches are twice this size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of passes over the training set.
    #[serde(default = "default_n_epochs")]
    pub n_epochs: usize,

    /// Optimizer, e.g. `"AdamW"` or `"torch.optim.AdamW"`.
    #[serde(default = "default_optimizer")]
    pub optimizer: OptimizerKind,

    /// Learning-rate schedule, e.g. `"OneCycleLR"`.
    #[serde(default = "default_lr_sched")]
    pub lr_sched: LrSchedulerKind,

    /// Peak learning rate.
    #[serde(default = "default_lr")]
    pub lr: f64,

    /// Momentum coefficients. Adam/AdamW use both; SGD uses the first.
    #[serde(default = "default_betas")]
    pub betas: (f64, f64),

    /// Weight of the NCE term: `loss = mim + gamma * nce`.
    #[serde(default = "default_gamma")]
    pub gamma: f64,

    /// L2 weight decay. Zero disables it for Adam and SGD.
    #[serde(default)]
    pub weight_decay: f64,

    /// Clip gradients to this L2 norm when set.
    #[serde(default)]
    pub max_grad_norm: Option<f64>,

    /// Steps between progress lines within an epoch.
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,

    /// Fraction of the one-cycle schedule spent increasing the learning rate.
    #[serde(default = "default_pct_start")]
    pub pct_start: f64,

    /// One-cycle initial learning rate is `lr / div_factor`.
    #[serde(default = "default_div_factor")]
    pub div_factor: f64,

    /// One-cycle minimum learning rate is `initial_lr / final_div_factor`.
    #[serde(default = "default_final_div_factor")]
    pub final_div_factor: f64,

    /// Linear warmup epochs for the cosine schedule.
    #[serde(default)]
    pub warmup_epochs: usize,

    /// Shuffle the training set with this seed. `None` keeps dataset order.
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
}

fn default_batch_size() -> usize {
    64
}
fn default_n_epochs() -> usize {
    100
}
fn default_optimizer() -> OptimizerKind {
    OptimizerKind::AdamW
}
fn default_lr_sched() -> LrSchedulerKind {
    LrSchedulerKind::OneCycle
}
fn default_lr() -> f64 {
    1e-4
}
fn default_betas() -> (f64, f64) {
    (0.9, 0.999)
}
fn default_gamma() -> f64 {
    0.1
}
fn default_log_interval() -> usize {
    5
}
fn default_pct_start() -> f64 {
    0.02
}
fn default_div_factor() -> f64 {
    25.0
}
fn default_final_div_factor() -> f64 {
    1e7
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            n_epochs: default_n_epochs(),
            optimizer: default_optimizer(),
            lr_sched: default_lr_sched(),
            lr: default_lr(),
            betas: default_betas(),
            gamma: default_gamma(),
            weight_decay: 0.0,
            max_grad_norm: None,
            log_interval: default_log_interval(),
            pct_start: default_pct_start(),
            div_factor: default_div_factor(),
            final_div_factor: default_final_div_factor(),
            warmup_epochs: 0,
            shuffle_seed: None,
        }
    }
}

impl TrainConfig {
    /// Validation batch size, always twice the training batch size.
    pub fn val_batch_size(&self) -> usize {
        self.batch_size * 2
    }

    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.batch_size == 0 {
            return Err(TrainError::InvalidConfig("batch_size must be > 0".into()));
        }
        if self.n_epochs == 0 {
            return Err(TrainError::InvalidConfig("n_epochs must be > 0".into()));
        }
        if self.log_interval == 0 {
            return Err(TrainError::InvalidConfig("log_interval must be > 0".into()));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(TrainError::InvalidConfig(format!(
                "lr must be a positive number, got {}",
                self.lr
            )));
        }
        let (beta_1, beta_2) = self.betas;
        for beta in [beta_1, beta_2] {
            if !(0.0..1.0).contains(&beta) {
                return Err(TrainError::InvalidConfig(format!(
                    "betas must lie in [0, 1), got ({beta_1}, {beta_2})"
                )));
            }
        }
        if !(self.gamma.is_finite() && self.gamma >= 0.0) {
            return Err(TrainError::InvalidConfig(format!(
                "gamma must be a non-negative number, got {}",
                self.gamma
            )));
        }
        if self.weight_decay < 0.0 {
            return Err(TrainError::InvalidConfig("weight_decay must be >= 0".into()));
        }
        if let Some(norm) = self.max_grad_norm {
            if norm <= 0.0 {
                return Err(TrainError::InvalidConfig("max_grad_norm must be > 0".into()));
            }
        }
        if !(0.0..=1.0).contains(&self.pct_start) {
            return Err(TrainError::InvalidConfig("pct_start must lie in [0, 1]".into()));
        }
        if self.div_factor <= 0.0 || self.final_div_factor <= 0.0 {
            return Err(TrainError::InvalidConfig(
                "div_factor and final_div_factor must be > 0".into(),
            ));
        }
        if self.gamma == 0.0 {
            tracing::warn!("gamma = 0, the NCE term does not contribute to the loss");
        }
        Ok(())
    }
}

/// Optional overrides for `MaskedContrastiveConfig` fields.
///
/// The input dimension always comes from the data, so only the remaining
/// model hyperparameters can be set here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelOverrides {
    /// Encoder hidden dimension.
    pub d_hidden: Option<usize>,
    /// Projection head output dimension.
    pub d_proj: Option<usize>,
    /// Probability that a feature is masked out.
    pub mask_ratio: Option<f64>,
    /// InfoNCE softmax temperature.
    pub temperature: Option<f64>,
    /// Dropout after the encoder activation.
    pub dropout: Option<f64>,
}

impl ModelOverrides {
    /// Build a model config for `d_input` features with these overrides applied.
    pub fn to_model_config(&self, d_input: usize) -> MaskedContrastiveConfig {
        let mut config = MaskedContrastiveConfig::new(d_input);
        if let Some(d) = self.d_hidden {
            config.d_hidden = d;
        }
        if let Some(d) = self.d_proj {
            config.d_proj = d;
        }
        if let Some(r) = self.mask_ratio {
            config.mask_ratio = r;
        }
        if let Some(t) = self.temperature {
            config.temperature = t;
        }
        if let Some(p) = self.dropout {
            config.dropout = p;
        }
        config
    }
}

/// Load and deserialize a `PretrainConfig` from a TOML file.
pub fn load_pretrain_toml(path: &Path) -> anyhow::Result<PretrainConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    let config: PretrainConfig = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "Loaded pretrain config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.batch_size, 64);
        assert_eq!(cfg.val_batch_size(), 128);
        assert_eq!(cfg.optimizer, OptimizerKind::AdamW);
        assert_eq!(cfg.lr_sched, LrSchedulerKind::OneCycle);
        assert_eq!(cfg.log_interval, 5);
        assert!((cfg.pct_start - 0.02).abs() < 1e-12);
        assert!((cfg.final_div_factor - 1e7).abs() < 1e-3);
        assert!(cfg.shuffle_seed.is_none());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_deserialize_full_toml() {
        let toml_str = r#"
[train]
batch_size = 32
n_epochs = 40
optimizer = "torch.optim.AdamW"
lr_sched = "torch.optim.lr_scheduler.OneCycleLR"
lr = 5e-4
betas = [0.9, 0.95]
gamma = 0.5

[model]
d_hidden = 128
mask_ratio = 0.6
"#;
        let config: PretrainConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.train.batch_size, 32);
        assert_eq!(config.train.val_batch_size(), 64);
        assert_eq!(config.train.n_epochs, 40);
        assert_eq!(config.train.optimizer, OptimizerKind::AdamW);
        assert_eq!(config.train.lr_sched, LrSchedulerKind::OneCycle);
        assert!((config.train.betas.1 - 0.95).abs() < 1e-12);
        assert!((config.train.gamma - 0.5).abs() < 1e-12);
        assert_eq!(config.model.d_hidden, Some(128));
        assert!(config.model.d_proj.is_none());
    }

    #[test]
    fn test_deserialize_optional_model_section() {
        let toml_str = r#"
[train]
optimizer = "sgd"
lr_sched = "constant"
"#;
        let config: PretrainConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.train.optimizer, OptimizerKind::Sgd);
        assert_eq!(config.train.lr_sched, LrSchedulerKind::Constant);
        assert!(config.model.d_hidden.is_none());
    }

    #[test]
    fn test_unknown_optimizer_rejected() {
        let toml_str = r#"
[train]
optimizer = "__import__('os').system('true')"
"#;
        let err = toml::from_str::<PretrainConfig>(toml_str).unwrap_err();
        assert!(
            err.to_string().contains("Unknown optimizer"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cfg = TrainConfig {
            batch_size: 0,
            ..TrainConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(TrainError::InvalidConfig(_))));

        let cfg = TrainConfig {
            betas: (0.9, 1.0),
            ..TrainConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(TrainError::InvalidConfig(_))));

        let cfg = TrainConfig {
            lr: f64::NAN,
            ..TrainConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(TrainError::InvalidConfig(_))));
    }

    #[test]
    fn test_model_overrides() {
        let overrides = ModelOverrides {
            d_hidden: Some(64),
            temperature: Some(0.2),
            ..ModelOverrides::default()
        };
        let config = overrides.to_model_config(48);
        assert_eq!(config.d_input, 48);
        assert_eq!(config.d_hidden, 64);
        assert!((config.temperature - 0.2).abs() < 1e-12);
        // Untouched fields keep their defaults.
        assert_eq!(config.d_proj, MaskedContrastiveConfig::new(48).d_proj);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pretrain.toml");
        std::fs::write(&path, "[train]\nn_epochs = 3\n").unwrap();
        let config = load_pretrain_toml(&path).unwrap();
        assert_eq!(config.train.n_epochs, 3);

        assert!(load_pretrain_toml(&dir.path().join("missing.toml")).is_err());
    }
}
