// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams other layers plug into:
//
//   ExampleSource   — where labelled examples come from
//   TextClassifier  — anything that can score raw texts
//                     (the trained model, or a stub in tests)
//   EpochSubscriber — receives the trainer's per-epoch records
//                     (metrics CSV, model card, hub publishing)

use std::path::Path;

use anyhow::Result;

use crate::domain::epoch::EpochSummary;
use crate::domain::example::{Example, Split};

// ─── ExampleSource ────────────────────────────────────────────────────────────
/// Any component that can load a labelled corpus split.
///
/// Implementations:
///   - CorpusLoader → CSV files or an aclImdb-style directory tree
pub trait ExampleSource {
    fn load_split(&self, split: Split) -> Result<Vec<Example>>;
}

// ─── TextClassifier ───────────────────────────────────────────────────────────
/// Any component that returns class probabilities for raw texts.
/// One call with N texts counts as N model queries.
pub trait TextClassifier {
    fn predict_proba(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

// ─── EpochSubscriber ──────────────────────────────────────────────────────────
/// Receives structured records from the training loop.
///
/// `history` always includes `summary` as its last element.
pub trait EpochSubscriber {
    fn on_epoch_end(&mut self, summary: &EpochSummary, history: &[EpochSummary]) -> Result<()>;

    /// Called once after the final epoch with the directory
    /// holding the latest checkpoint.
    fn on_train_end(&mut self, _history: &[EpochSummary], _checkpoint_dir: &Path) -> Result<()> {
        Ok(())
    }
}
