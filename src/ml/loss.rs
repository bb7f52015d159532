// ============================================================
// Layer 5 — Loss Building Blocks
// ============================================================
// Knowledge discontinuity of a batch:
//
//   dist[i][j]      = ||h_i - h_j||₂ + ε
//   loss_dist[i][j] = |l_i - l_j|
//   score           = Σ_ij loss_dist[i][j] / dist[i][j]
//
// Regularized loss = Σ_i l_i + λ · score
//
// The score is large when two examples sit close together in
// representation space but far apart in loss.

use burn::prelude::*;
use burn::tensor::activation::{log_softmax, softmax};

/// Squared distances are clamped to this before the square root
/// so the gradient stays finite on the diagonal (and for
/// coinciding representations).
const MIN_SQUARED_DISTANCE: f64 = 1e-12;

/// Per-example cross-entropy: [batch, classes] × [batch] → [batch].
///
/// With `softmax_first` the logits are turned into probabilities
/// before the log-softmax of the cross-entropy is applied.
pub fn per_example_cross_entropy<B: Backend>(
    logits:        Tensor<B, 2>,
    labels:        Tensor<B, 1, Int>,
    softmax_first: bool,
) -> Tensor<B, 1> {
    let [batch_size, _] = logits.dims();
    let input = if softmax_first { softmax(logits, 1) } else { logits };

    log_softmax(input, 1)
        .gather(1, labels.reshape([batch_size, 1]))
        .reshape([batch_size])
        .neg()
}

/// Pairwise Euclidean distance matrix plus the stabilizer:
/// [batch, d] → [batch, batch]
pub fn pairwise_distance<B: Backend>(hidden: Tensor<B, 2>, stabilizer: f64) -> Tensor<B, 2> {
    let [n, d] = hidden.dims();
    let rows = hidden.clone().reshape([n, 1, d]).expand([n, n, d]);
    let cols = hidden.reshape([1, n, d]).expand([n, n, d]);

    (rows - cols)
        .powf_scalar(2.0)
        .sum_dim(2)
        .reshape([n, n])
        .clamp_min(MIN_SQUARED_DISTANCE)
        .sqrt()
        .add_scalar(stabilizer)
}

/// Knowledge discontinuity score of a batch, shape [1].
pub fn knowledge_discontinuity<B: Backend>(
    losses:     Tensor<B, 1>,
    hidden:     Tensor<B, 2>,
    stabilizer: f64,
) -> Tensor<B, 1> {
    let [n] = losses.dims();
    let dist = pairwise_distance(hidden, stabilizer);

    let column = losses.reshape([n, 1]);
    let loss_dist = (column.clone().expand([n, n]) - column.transpose().expand([n, n])).abs();

    (loss_dist / dist).sum()
}

/// Σ per-example loss + λ · discontinuity, shape [1].
pub fn regularized_loss<B: Backend>(
    losses:     Tensor<B, 1>,
    hidden:     Tensor<B, 2>,
    lambda:     f64,
    stabilizer: f64,
) -> Tensor<B, 1> {
    let score = knowledge_discontinuity(losses.clone(), hidden, stabilizer);
    losses.sum() + score.mul_scalar(lambda)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KlReduction {
    Sum,
    /// Sum divided by the batch size
    BatchMean,
}

/// KL(softmax(target) ‖ softmax(input)), computed from logits.
pub fn kl_divergence<B: Backend>(
    input:     Tensor<B, 2>,
    target:    Tensor<B, 2>,
    reduction: KlReduction,
) -> Tensor<B, 1> {
    let [batch_size, _] = input.dims();
    let target_log = log_softmax(target.clone(), 1);
    let target_prob = softmax(target, 1);

    let total = (target_prob * (target_log - log_softmax(input, 1))).sum();
    match reduction {
        KlReduction::Sum => total,
        KlReduction::BatchMean => total.div_scalar(batch_size as f64),
    }
}
