use serde::{Deserialize, Serialize};

/// What the trainer reports once per epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Optimizer steps taken so far
    pub step: usize,

    /// Mean training objective over the epoch's batches
    pub train_loss: f64,

    /// Mean evaluation objective over the validation batches
    pub eval_loss: f64,

    /// Fraction of validation examples classified correctly
    pub eval_accuracy: f64,
}

impl EpochSummary {
    /// Returns true if this epoch improved over the previous best eval_loss
    pub fn is_improvement(&self, best_eval_loss: f64) -> bool {
        self.eval_loss < best_eval_loss
    }
}
