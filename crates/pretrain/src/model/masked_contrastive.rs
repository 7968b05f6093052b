use burn::nn;
use burn::prelude::*;
use burn::tensor::Distribution;

use crate::model::{DualLoss, DualLossModel};
use crate::training::data::FeatureBatch;
use crate::training::loss::{info_nce_loss, masked_reconstruction_loss};

/// Configuration for the MaskedContrastiveModel.
///
/// ```text
/// (batch, d_input) ── Bernoulli(mask_ratio) mask ──► visible view
///   → Linear(d_input→d_hidden) → GELU → Dropout        = h
///   h → Linear(d_hidden→d_input)                       = reconstruction (MIM head)
///   h → Linear(d_hidden→d_proj)                        = projection     (NCE head)
/// ```
#[derive(Config, Debug)]
pub struct MaskedContrastiveConfig {
    /// Input feature dimension.
    pub d_input: usize,
    /// Encoder hidden dimension.
    #[config(default = 256)]
    pub d_hidden: usize,
    /// Projection head output dimension.
    #[config(default = 128)]
    pub d_proj: usize,
    /// Probability that each feature is hidden from the encoder.
    #[config(default = 0.4)]
    pub mask_ratio: f64,
    /// InfoNCE softmax temperature.
    #[config(default = 0.1)]
    pub temperature: f64,
    /// Dropout probability after the encoder activation.
    #[config(default = 0.1)]
    pub dropout: f64,
}

/// Masked-reconstruction + contrastive model.
///
/// Training forward draws two independent masks: the first view's
/// reconstruction gives the MIM loss, and the projections of both views give
/// the InfoNCE loss. Evaluation forward reports only the MIM loss of one view.
#[derive(Module, Debug)]
pub struct MaskedContrastiveModel<B: Backend> {
    encoder: nn::Linear<B>,
    decoder: nn::Linear<B>,
    projector: nn::Linear<B>,
    dropout: nn::Dropout,
    mask_ratio: f64,
    temperature: f64,
}

impl MaskedContrastiveConfig {
    /// Initialize a MaskedContrastiveModel with the given configuration.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MaskedContrastiveModel<B> {
        MaskedContrastiveModel {
            encoder: nn::LinearConfig::new(self.d_input, self.d_hidden).init(device),
            decoder: nn::LinearConfig::new(self.d_hidden, self.d_input).init(device),
            projector: nn::LinearConfig::new(self.d_hidden, self.d_proj).init(device),
            dropout: nn::DropoutConfig::new(self.dropout).init(),
            mask_ratio: self.mask_ratio,
            temperature: self.temperature,
        }
    }
}

/// A masked view of the input: what the encoder saw and where the holes are.
struct MaskedView<B: Backend> {
    /// 1.0 where a feature was hidden.
    mask: Tensor<B, 2>,
    hidden: Tensor<B, 2>,
}

impl<B: Backend> MaskedContrastiveModel<B> {
    /// Encoder forward: `(batch, d_input)` → `(batch, d_hidden)`.
    pub fn encode(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.encoder.forward(x);
        let x = burn::tensor::activation::gelu(x);
        self.dropout.forward(x)
    }

    /// Reconstruct the full input from an encoding.
    pub fn reconstruct(&self, h: Tensor<B, 2>) -> Tensor<B, 2> {
        self.decoder.forward(h)
    }

    /// Project an encoding into the contrastive space.
    pub fn project(&self, h: Tensor<B, 2>) -> Tensor<B, 2> {
        self.projector.forward(h)
    }

    fn masked_view(&self, x: &Tensor<B, 2>) -> MaskedView<B> {
        let mask = Tensor::<B, 2>::random(
            x.dims(),
            Distribution::Bernoulli(self.mask_ratio),
            &x.device(),
        );
        let keep = mask.clone().neg().add_scalar(1.0);
        let hidden = self.encode(x.clone() * keep);
        MaskedView { mask, hidden }
    }
}

impl<B: Backend> DualLossModel<B> for MaskedContrastiveModel<B> {
    fn forward_losses(&self, batch: FeatureBatch<B>) -> DualLoss<B> {
        let x = batch.features;
        let first = self.masked_view(&x);
        let second = self.masked_view(&x);

        let reconstruction = self.reconstruct(first.hidden.clone());
        let mim = masked_reconstruction_loss(reconstruction, x, first.mask);

        let z1 = self.project(first.hidden);
        let z2 = self.project(second.hidden);
        let nce = info_nce_loss(z1, z2, self.temperature);

        DualLoss { mim, nce }
    }

    fn forward_eval_loss(&self, batch: FeatureBatch<B>) -> Tensor<B, 1> {
        let x = batch.features;
        let view = self.masked_view(&x);
        let reconstruction = self.reconstruct(view.hidden);
        masked_reconstruction_loss(reconstruction, x, view.mask)
    }
}
