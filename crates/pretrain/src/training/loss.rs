//! Masked-reconstruction (MIM) and InfoNCE losses.
//!
//! Both loss functions are generic over `B: Backend` and operate on burn tensors.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;

/// Mean squared reconstruction error over masked positions only.
///
/// # Arguments
/// - `pred`: shape `(batch, dim)`: reconstructed features
/// - `target`: shape `(batch, dim)`: original features
/// - `mask`: shape `(batch, dim)`: 1.0 where the feature was hidden from the
///   encoder, 0.0 where it was visible
///
/// # Returns
/// Scalar loss tensor of shape `(1,)`. Returns 0 if nothing was masked.
pub fn masked_reconstruction_loss<B: Backend>(
    pred: Tensor<B, 2>,
    target: Tensor<B, 2>,
    mask: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let squared = (pred - target).powf_scalar(2.0);
    let masked_count = mask.clone().sum().clamp_min(1.0);
    (squared * mask).sum() / masked_count
}

/// Scale each row to unit L2 norm.
pub fn l2_normalize<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let norm = x.clone().powf_scalar(2.0).sum_dim(1).sqrt().clamp_min(1e-8);
    x / norm
}

/// Cross-view InfoNCE loss.
///
/// Row `i` of `anchors` and row `i` of `positives` are two views of the same
/// sample; every other row of `positives` is a negative for anchor `i`.
/// Rows are L2-normalised, so logits are cosine similarities over
/// `temperature`.
///
/// # Arguments
/// - `anchors`: shape `(batch, d)`
/// - `positives`: shape `(batch, d)`
///
/// # Returns
/// Scalar loss tensor of shape `(1,)`.
pub fn info_nce_loss<B: Backend>(
    anchors: Tensor<B, 2>,
    positives: Tensor<B, 2>,
    temperature: f64,
) -> Tensor<B, 1> {
    let device = anchors.device();
    let [batch_size, _d] = anchors.dims();

    let anchors = l2_normalize(anchors);
    let positives = l2_normalize(positives);
    let logits = anchors.matmul(positives.transpose()) / temperature; // (batch, batch)

    // Labels: the matching view sits on the diagonal
    let labels = Tensor::<B, 1, Int>::arange(0..batch_size as i64, &device);

    CrossEntropyLossConfig::new()
        .init(&device)
        .forward(logits, labels)
}
