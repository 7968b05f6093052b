//! Pretraining pipeline: feature data loading, MIM/InfoNCE losses, optimizer
//! and learning-rate schedule selection, running metrics, and the epoch loop.

pub mod data;
pub mod loss;
pub mod metrics;
pub mod optim;
pub mod schedule;
pub mod trainer;
