/// Errors raised while configuring or running the training loop.
///
/// Tensor-level failures (shape mismatches and the like) are burn panics and
/// never show up here.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    /// Optimizer name did not match any supported optimizer.
    #[error("Unknown optimizer `{0}` (supported: adam, adamw, sgd)")]
    UnknownOptimizer(String),

    /// LR scheduler name did not match any supported schedule.
    #[error("Unknown lr scheduler `{0}` (supported: onecycle, cosine, constant)")]
    UnknownScheduler(String),

    /// A config value is out of range.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A dataset has no samples, so no batch can be formed.
    #[error("The {split} dataset is empty")]
    EmptyDataset { split: &'static str },

    /// Writing to the console sink failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
