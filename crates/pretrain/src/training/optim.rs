//! Optimizer selection.
//!
//! The optimizer is named in the config and resolved against a closed set of
//! burn optimizers. Names are matched case-insensitively on their last
//! dot-separated segment, so `"AdamW"`, `"adamw"` and `"torch.optim.AdamW"`
//! all select [`OptimizerKind::AdamW`].

use std::fmt;
use std::str::FromStr;

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{AdamConfig, AdamWConfig, GradientsParams, Optimizer, SgdConfig};
use burn::tensor::backend::AutodiffBackend;
use serde::Deserialize;

use crate::config::TrainConfig;
use crate::error::TrainError;

/// Supported optimizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum OptimizerKind {
    Adam,
    AdamW,
    Sgd,
}

impl FromStr for OptimizerKind {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().rsplit('.').next().unwrap_or_default();
        match name.to_ascii_lowercase().as_str() {
            "adam" => Ok(Self::Adam),
            "adamw" => Ok(Self::AdamW),
            "sgd" => Ok(Self::Sgd),
            _ => Err(TrainError::UnknownOptimizer(s.to_string())),
        }
    }
}

impl TryFrom<String> for OptimizerKind {
    type Error = TrainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adam => write!(f, "Adam"),
            Self::AdamW => write!(f, "AdamW"),
            Self::Sgd => write!(f, "SGD"),
        }
    }
}

/// A burn optimizer with its concrete type erased.
///
/// Each burn optimizer config yields a different `OptimizerAdaptor` type;
/// boxing the step keeps the trainer independent of which one was chosen.
pub struct ResolvedOptimizer<M> {
    kind: OptimizerKind,
    step_fn: Box<dyn FnMut(f64, M, GradientsParams) -> M + Send>,
}

impl<M> ResolvedOptimizer<M> {
    pub fn kind(&self) -> OptimizerKind {
        self.kind
    }

    /// Apply one update at learning rate `lr` and return the updated module.
    pub fn step(&mut self, lr: f64, module: M, grads: GradientsParams) -> M {
        (self.step_fn)(lr, module, grads)
    }
}

fn erase<B, M, O>(kind: OptimizerKind, mut optim: O) -> ResolvedOptimizer<M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B> + 'static,
{
    ResolvedOptimizer {
        kind,
        step_fn: Box::new(move |lr, module, grads| optim.step(lr, module, grads)),
    }
}

impl OptimizerKind {
    /// Build the burn optimizer for this kind from the training config.
    ///
    /// `betas` feeds Adam/AdamW's moment decay rates and SGD's momentum
    /// (first beta only; zero disables momentum).
    pub fn init<B, M>(self, config: &TrainConfig) -> ResolvedOptimizer<M>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + 'static,
    {
        let (beta_1, beta_2) = config.betas;
        let clipping = config
            .max_grad_norm
            .map(|norm| GradientClippingConfig::Norm(norm as f32));
        let decay = (config.weight_decay > 0.0)
            .then(|| WeightDecayConfig::new(config.weight_decay as _));

        match self {
            Self::Adam => {
                let optim = AdamConfig::new()
                    .with_beta_1(beta_1 as f32)
                    .with_beta_2(beta_2 as f32)
                    .with_weight_decay(decay)
                    .with_grad_clipping(clipping)
                    .init();
                erase::<B, M, _>(self, optim)
            }
            Self::AdamW => {
                let optim = AdamWConfig::new()
                    .with_beta_1(beta_1 as f32)
                    .with_beta_2(beta_2 as f32)
                    .with_weight_decay(config.weight_decay as f32)
                    .with_grad_clipping(clipping)
                    .init();
                erase::<B, M, _>(self, optim)
            }
            Self::Sgd => {
                let momentum =
                    (beta_1 > 0.0).then(|| MomentumConfig::new().with_momentum(beta_1 as _));
                let optim = SgdConfig::new()
                    .with_momentum(momentum)
                    .with_weight_decay(decay)
                    .with_gradient_clipping(clipping)
                    .init();
                erase::<B, M, _>(self, optim)
            }
        }
    }
}
