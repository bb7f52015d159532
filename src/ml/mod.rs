// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn framework specific code lives in this layer.
//
//   model.rs     — transformer encoder classifier (optional
//                  single-query decoder stack)
//   wrapper.rs   — knowledge-continuity wrapper: returns the
//                  hidden state of a Beta-sampled layer along
//                  with the logits
//   loss.rs      — per-example cross-entropy, knowledge
//                  discontinuity score, KL divergence
//   smoothing.rs — ALUM-style adversarial smoothing loss
//   objective.rs — the training objectives built from the above
//   trainer.rs   — training loop: gradient accumulation, AdamW,
//                  evaluation, checkpoints, epoch events
//   inferencer.rs — loads a checkpoint and scores raw texts

/// Transformer classifier architecture
pub mod model;

/// Hidden-state wrapper with Beta-distributed layer sampling
pub mod wrapper;

/// Loss building blocks
pub mod loss;

/// Adversarial smoothing loss
pub mod smoothing;

/// Training objectives
pub mod objective;

/// Full training loop with validation and checkpointing
pub mod trainer;

/// Inference engine — loads checkpoint and predicts class probabilities
pub mod inferencer;

#[cfg(test)]
pub(crate) mod test_support {
    use super::model::ClassifierConfig;

    pub type TestBackend = burn::backend::NdArray;
    pub type TestAutodiffBackend = burn::backend::Autodiff<burn::backend::NdArray>;

    /// vocab 20, max_seq_len 8, d_model 16, 2 heads, 2 layers, d_ff 32, no dropout
    pub fn tiny_config() -> ClassifierConfig {
        ClassifierConfig::new(20, 8, 16, 2, 2, 32, 0.0)
    }
}
