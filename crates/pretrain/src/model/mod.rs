//! Model contract for the trainer and the reference masked-contrastive model.

pub mod masked_contrastive;

use burn::prelude::*;

use crate::training::data::FeatureBatch;

/// The two scalar losses produced by a training-mode forward pass.
#[derive(Debug, Clone)]
pub struct DualLoss<B: Backend> {
    /// Masked reconstruction loss, shape `(1,)`.
    pub mim: Tensor<B, 1>,
    /// Contrastive loss, shape `(1,)`.
    pub nce: Tensor<B, 1>,
}

impl<B: Backend> DualLoss<B> {
    /// `mim + gamma * nce`, the quantity that is backpropagated.
    pub fn combined(&self, gamma: f64) -> Tensor<B, 1> {
        self.mim.clone() + self.nce.clone() * gamma
    }
}

/// A model the trainer can drive.
///
/// Implemented for every backend so the same model type serves training
/// (autodiff backend) and evaluation (its inner, gradient-free backend).
pub trait DualLossModel<B: Backend>: Module<B> {
    /// Training-mode forward pass returning both loss terms.
    fn forward_losses(&self, batch: FeatureBatch<B>) -> DualLoss<B>;

    /// Evaluation-mode forward pass returning a single scalar loss.
    fn forward_eval_loss(&self, batch: FeatureBatch<B>) -> Tensor<B, 1>;
}
