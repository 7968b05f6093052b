//! Dual-loss pretraining on burn.
//!
//! Trains a model that produces a masked-reconstruction (MIM) loss and a
//! contrastive (InfoNCE) loss, combined as `mim + gamma * nce`. The crate
//! sequences burn's data loaders, optimizers and autodiff into an epoch loop
//! with per-step progress logging and a per-epoch validation pass.
//!
//! # Key types
//!
//! - [`Trainer`]: the epoch/step driver
//! - [`PretrainConfig`] / [`TrainConfig`]: TOML configuration
//! - [`OptimizerKind`] / [`LrSchedulerKind`]: closed sets of supported
//!   optimizers and learning-rate schedules
//! - [`DualLossModel`]: what a model must provide to be trained
//! - [`MaskedContrastiveModel`]: the reference model

pub mod config;
pub mod error;
pub mod model;
pub mod training;

pub use config::{load_pretrain_toml, PretrainConfig, TrainConfig};
pub use error::TrainError;
pub use model::masked_contrastive::{MaskedContrastiveConfig, MaskedContrastiveModel};
pub use model::{DualLoss, DualLossModel};
pub use training::data::{FeatureBatch, FeatureBatcher, FeatureSample};
pub use training::metrics::{EpochSummary, StepLog, TrainingHistory};
pub use training::optim::OptimizerKind;
pub use training::schedule::{LrScheduler, LrSchedulerKind};
pub use training::trainer::{TrainOutcome, Trainer};
